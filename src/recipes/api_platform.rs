use crate::config::{Operation, PatchDefinition};
use crate::patch::ConfigValue;
use crate::recipes::{
    base_segments, class_name, snake_case, Recipe, RecipeError, SymbolLookup, APP_NAMESPACE,
};
use std::str::FromStr;

pub const API_PLATFORM_CONFIG: &str = "config/packages/api_platform.yaml";

const MAPPING_PATHS: &str = "api_platform.mapping.paths";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFlavor {
    #[default]
    Attribute,
    Xml,
}

impl FromStr for ConfigFlavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "attribute" | "attributes" => Ok(ConfigFlavor::Attribute),
            "xml" => Ok(ConfigFlavor::Xml),
            other => Err(format!("unknown config flavor '{other}' (attribute, xml)")),
        }
    }
}

/// Answers to the API resource generator's questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChoices {
    /// Short name of an existing model
    pub name: String,
    pub flavor: ConfigFlavor,
    /// Optional module below `src/`, e.g. `Catalog`
    pub base_path: Option<String>,
}

/// Classes the resource is built around, after the lookup succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub model_class: String,
    pub identity_class: String,
    pub resource_class: String,
    /// The identity is a UUID rather than a numeric id
    pub uses_uuid: bool,
}

impl ResourceChoices {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flavor: ConfigFlavor::Attribute,
            base_path: None,
        }
    }

    /// Resolve the model and its identity through `lookup`.
    ///
    /// The identity is looked up as `<Name>Id` first, then `<Name>Uuid`.
    pub fn resolve(&self, lookup: &dyn SymbolLookup) -> Result<ResourceNames, RecipeError> {
        let name = class_name(&self.name)?;
        let namespace = self.namespace()?;

        let model_class = format!(r"{namespace}\Domain\Model\{name}");
        if !lookup.class_exists(&model_class) {
            return Err(RecipeError::MissingModel { class: model_class });
        }

        let identity_namespace = format!(r"{namespace}\Domain\Model\ValueObject\Identity");
        let id_class = format!(r"{identity_namespace}\{name}Id");
        let uuid_class = format!(r"{identity_namespace}\{name}Uuid");
        let (identity_class, uses_uuid) = if lookup.class_exists(&id_class) {
            (id_class, false)
        } else if lookup.class_exists(&uuid_class) {
            (uuid_class, true)
        } else {
            return Err(RecipeError::MissingIdentity {
                model: model_class,
                id_class,
                uuid_class,
            });
        };

        Ok(ResourceNames {
            resource_class: format!(r"{namespace}\Infrastructure\ApiPlatform\Resource\{name}Resource"),
            model_class,
            identity_class,
            uses_uuid,
        })
    }

    fn namespace(&self) -> Result<String, RecipeError> {
        let mut namespace = APP_NAMESPACE.to_string();
        for segment in base_segments(self.base_path.as_deref())? {
            namespace.push('\\');
            namespace.push_str(&segment);
        }
        Ok(namespace)
    }

    /// `%kernel.project_dir%/src[/<base>]/<tail>`
    fn project_path(&self, tail: &str) -> Result<String, RecipeError> {
        let mut path = "%kernel.project_dir%/src".to_string();
        for segment in base_segments(self.base_path.as_deref())? {
            path.push('/');
            path.push_str(&segment);
        }
        path.push('/');
        path.push_str(tail);
        Ok(path)
    }
}

/// API Platform mapping paths for a new resource.
///
/// The resource directory is always registered; the XML flavor also
/// registers the directory holding its XML resource configuration.
pub fn resource_patches(
    choices: &ResourceChoices,
    lookup: &dyn SymbolLookup,
) -> Result<Recipe, RecipeError> {
    let names = choices.resolve(lookup)?;
    let slug = snake_case(&class_name(&choices.name)?);

    let mut paths = vec![(
        format!("resource-{slug}-path"),
        choices.project_path("Infrastructure/ApiPlatform/Resource")?,
    )];
    if choices.flavor == ConfigFlavor::Xml {
        paths.push((
            format!("resource-{slug}-config-path"),
            choices.project_path("Infrastructure/ApiPlatform/Config")?,
        ));
    }

    let patches = paths
        .into_iter()
        .map(|(id, path)| PatchDefinition {
            id,
            file: API_PLATFORM_CONFIG.to_string(),
            format: None,
            create_missing: true,
            operation: Operation::AppendToList {
                path: MAPPING_PATHS.to_string(),
                value: ConfigValue::String(path),
            },
        })
        .collect();

    Ok(Recipe {
        name: format!("resource-{slug}"),
        description: format!("API Platform mapping for {}", names.resource_class),
        patches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipes::KnownSymbols;

    fn appended(recipe: &Recipe) -> Vec<String> {
        recipe
            .patches
            .iter()
            .map(|patch| match &patch.operation {
                Operation::AppendToList { path, value } => {
                    assert_eq!(path, MAPPING_PATHS);
                    value.to_string()
                }
                other => panic!("unexpected operation {other:?}"),
            })
            .collect()
    }

    #[test]
    fn attribute_flavor_registers_resource_dir() {
        let lookup = KnownSymbols::new([
            r"App\Domain\Model\Customer",
            r"App\Domain\Model\ValueObject\Identity\CustomerId",
        ]);
        let recipe = resource_patches(&ResourceChoices::new("Customer"), &lookup).unwrap();
        assert_eq!(
            appended(&recipe),
            vec!["'%kernel.project_dir%/src/Infrastructure/ApiPlatform/Resource'"]
        );
        assert!(recipe.patches[0].create_missing);
        assert_eq!(recipe.patches[0].file, API_PLATFORM_CONFIG);
    }

    #[test]
    fn xml_flavor_with_base_path_and_uuid() {
        let lookup = KnownSymbols::new([
            r"App\Catalog\Domain\Model\Product",
            r"App\Catalog\Domain\Model\ValueObject\Identity\ProductUuid",
        ]);
        let choices = ResourceChoices {
            flavor: ConfigFlavor::Xml,
            base_path: Some("Catalog".to_string()),
            ..ResourceChoices::new("Product")
        };

        let names = choices.resolve(&lookup).unwrap();
        assert!(names.uses_uuid);
        assert_eq!(
            names.resource_class,
            r"App\Catalog\Infrastructure\ApiPlatform\Resource\ProductResource"
        );

        let recipe = resource_patches(&choices, &lookup).unwrap();
        assert_eq!(
            appended(&recipe),
            vec![
                "'%kernel.project_dir%/src/Catalog/Infrastructure/ApiPlatform/Resource'",
                "'%kernel.project_dir%/src/Catalog/Infrastructure/ApiPlatform/Config'",
            ]
        );
    }

    #[test]
    fn missing_model_fails() {
        let err = resource_patches(&ResourceChoices::new("Customer"), &KnownSymbols::default())
            .unwrap_err();
        assert_eq!(
            err,
            RecipeError::MissingModel {
                class: r"App\Domain\Model\Customer".to_string()
            }
        );
    }

    #[test]
    fn missing_identity_fails() {
        let lookup = KnownSymbols::new([r"App\Domain\Model\Customer"]);
        let err = resource_patches(&ResourceChoices::new("Customer"), &lookup).unwrap_err();
        assert!(matches!(err, RecipeError::MissingIdentity { .. }));
    }
}
