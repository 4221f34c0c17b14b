use crate::config::{Operation, PatchDefinition};
use crate::patch::ConfigValue;
use crate::recipes::{class_name, snake_case, Recipe, RecipeError, APP_NAMESPACE};
use std::fmt;
use std::str::FromStr;

pub const DOCTRINE_CONFIG: &str = "config/packages/doctrine.yaml";

const ATTRIBUTE_MAPPING_DIR: &str = "%kernel.project_dir%/src/Domain/Model";
const XML_MAPPING_DIR: &str = "%kernel.project_dir%/src/Infrastructure/Doctrine/ORM/Mapping";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityKind {
    Id,
    Uuid,
    #[default]
    None,
}

impl IdentityKind {
    /// Class name suffix of the identity value object.
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            IdentityKind::Id => Some("Id"),
            IdentityKind::Uuid => Some("Uuid"),
            IdentityKind::None => None,
        }
    }
}

impl FromStr for IdentityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(IdentityKind::Id),
            "uuid" => Ok(IdentityKind::Uuid),
            "none" | "n/a" => Ok(IdentityKind::None),
            other => Err(format!("unknown identity kind '{other}' (id, uuid, none)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityMapping {
    Attributes,
    Xml,
    #[default]
    None,
}

impl EntityMapping {
    fn mapping_type(self) -> Option<(&'static str, &'static str)> {
        match self {
            EntityMapping::Attributes => Some(("attribute", ATTRIBUTE_MAPPING_DIR)),
            EntityMapping::Xml => Some(("xml", XML_MAPPING_DIR)),
            EntityMapping::None => None,
        }
    }
}

impl FromStr for EntityMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "attributes" | "attribute" => Ok(EntityMapping::Attributes),
            "xml" => Ok(EntityMapping::Xml),
            "none" | "n/a" => Ok(EntityMapping::None),
            other => Err(format!(
                "unknown entity mapping '{other}' (attributes, xml, none)"
            )),
        }
    }
}

/// Answers to the model generator's questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoices {
    pub name: String,
    /// Append `Model` to the class name
    pub with_suffix: bool,
    pub identity: IdentityKind,
    pub entity: EntityMapping,
}

impl ModelChoices {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            with_suffix: false,
            identity: IdentityKind::None,
            entity: EntityMapping::None,
        }
    }

    pub fn names(&self) -> Result<ModelNames, RecipeError> {
        let base = class_name(&self.name)?;
        let model_short = if self.with_suffix {
            format!("{base}Model")
        } else {
            base.clone()
        };
        let table_name = snake_case(model_short.split("Model").next().unwrap_or(&model_short));

        let identity = self.identity.suffix().map(|suffix| {
            let identity_short = format!("{base}{suffix}");
            IdentityNames {
                class: format!(r"{APP_NAMESPACE}\Domain\Model\ValueObject\Identity\{identity_short}"),
                type_class: format!(
                    r"{APP_NAMESPACE}\Infrastructure\Doctrine\DBAL\Type\{identity_short}Type"
                ),
                type_name: snake_case(&identity_short),
            }
        });

        Ok(ModelNames {
            model_class: format!(r"{APP_NAMESPACE}\Domain\Model\{model_short}"),
            model_short,
            identity,
            table_name,
        })
    }
}

/// Class and type names derived from [`ModelChoices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelNames {
    pub model_class: String,
    pub model_short: String,
    pub identity: Option<IdentityNames>,
    pub table_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityNames {
    pub class: String,
    /// DBAL mapping type class
    pub type_class: String,
    /// Name the mapping type is registered under
    pub type_name: String,
}

impl fmt::Display for ModelNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (table {})", self.model_class, self.table_name)?;
        if let Some(identity) = &self.identity {
            write!(f, ", identity {} as '{}'", identity.class, identity.type_name)?;
        }
        Ok(())
    }
}

/// Doctrine configuration edits for a new model.
///
/// The identity mapping type is registered only for entities; the default
/// entity mapping points at the directory the chosen mapping style uses.
pub fn model_patches(choices: &ModelChoices) -> Result<Recipe, RecipeError> {
    let names = choices.names()?;
    let slug = snake_case(&names.model_short);
    let mut patches = Vec::new();

    if let (Some(identity), Some(_)) = (&names.identity, choices.entity.mapping_type()) {
        patches.push(doctrine_patch(
            format!("model-{slug}-dbal-type"),
            format!("doctrine.dbal.types.{}", identity.type_name),
            identity.type_class.as_str(),
        ));
    }

    if let Some((mapping_type, dir)) = choices.entity.mapping_type() {
        patches.push(doctrine_patch(
            format!("model-{slug}-mapping-type"),
            format!("doctrine.orm.mappings.{APP_NAMESPACE}.type"),
            mapping_type,
        ));
        patches.push(doctrine_patch(
            format!("model-{slug}-mapping-dir"),
            format!("doctrine.orm.mappings.{APP_NAMESPACE}.dir"),
            dir,
        ));
    }

    Ok(Recipe {
        name: format!("model-{slug}"),
        description: format!("Doctrine configuration for {}", names.model_class),
        patches,
    })
}

fn doctrine_patch(id: String, path: String, value: &str) -> PatchDefinition {
    PatchDefinition {
        id,
        file: DOCTRINE_CONFIG.to_string(),
        format: None,
        create_missing: false,
        operation: Operation::SetValue {
            path,
            value: ConfigValue::from(value),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices(identity: IdentityKind, entity: EntityMapping) -> ModelChoices {
        ModelChoices {
            identity,
            entity,
            ..ModelChoices::new("Customer")
        }
    }

    fn text(value: &str) -> ConfigValue {
        ConfigValue::from(value)
    }

    fn set_values(recipe: &Recipe) -> Vec<(String, ConfigValue)> {
        recipe
            .patches
            .iter()
            .map(|patch| match &patch.operation {
                Operation::SetValue { path, value } => (path.clone(), value.clone()),
                other => panic!("unexpected operation {other:?}"),
            })
            .collect()
    }

    #[test]
    fn derives_names() {
        let names = ModelChoices {
            with_suffix: true,
            ..choices(IdentityKind::Uuid, EntityMapping::Xml)
        }
        .names()
        .unwrap();
        assert_eq!(names.model_class, r"App\Domain\Model\CustomerModel");
        assert_eq!(names.table_name, "customer");
        let identity = names.identity.unwrap();
        assert_eq!(identity.class, r"App\Domain\Model\ValueObject\Identity\CustomerUuid");
        assert_eq!(
            identity.type_class,
            r"App\Infrastructure\Doctrine\DBAL\Type\CustomerUuidType"
        );
        assert_eq!(identity.type_name, "customer_uuid");
    }

    #[test]
    fn identity_and_attribute_entity() {
        let recipe = model_patches(&choices(IdentityKind::Id, EntityMapping::Attributes)).unwrap();
        assert_eq!(
            set_values(&recipe),
            vec![
                (
                    "doctrine.dbal.types.customer_id".to_string(),
                    text(r"App\Infrastructure\Doctrine\DBAL\Type\CustomerIdType")
                ),
                ("doctrine.orm.mappings.App.type".to_string(), text("attribute")),
                (
                    "doctrine.orm.mappings.App.dir".to_string(),
                    text("%kernel.project_dir%/src/Domain/Model")
                ),
            ]
        );
        assert!(recipe
            .patches
            .iter()
            .all(|patch| patch.file == DOCTRINE_CONFIG && !patch.create_missing));
    }

    #[test]
    fn xml_entity_without_identity() {
        let recipe = model_patches(&choices(IdentityKind::None, EntityMapping::Xml)).unwrap();
        assert_eq!(
            set_values(&recipe),
            vec![
                ("doctrine.orm.mappings.App.type".to_string(), text("xml")),
                (
                    "doctrine.orm.mappings.App.dir".to_string(),
                    text("%kernel.project_dir%/src/Infrastructure/Doctrine/ORM/Mapping")
                ),
            ]
        );
    }

    #[test]
    fn identity_without_entity_touches_nothing() {
        let recipe = model_patches(&choices(IdentityKind::Uuid, EntityMapping::None)).unwrap();
        assert!(recipe.patches.is_empty());
    }

    #[test]
    fn recipe_config_validates() {
        let recipe = model_patches(&choices(IdentityKind::Id, EntityMapping::Xml)).unwrap();
        assert!(recipe.into_config().validate().is_ok());
    }

    #[test]
    fn parses_choice_names() {
        assert_eq!("uuid".parse::<IdentityKind>().unwrap(), IdentityKind::Uuid);
        assert_eq!("n/a".parse::<EntityMapping>().unwrap(), EntityMapping::None);
        assert!("table".parse::<EntityMapping>().is_err());
    }
}
