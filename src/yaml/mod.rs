pub mod editor;
pub mod render;
pub mod scanner;
pub mod validator;

pub use editor::YamlEditor;
pub use validator::parse_document;
