pub mod editor;
pub mod scanner;
pub mod selector;

pub use editor::XmlEditor;
pub use scanner::{parse, Attribute, Element, XmlDocument};
pub use selector::{ElementSelector, Step};
