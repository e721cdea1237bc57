//! Per-type field schemas
//!
//! Each strategy type ships a TOML schema listing the fields its alias
//! namespace carries. The schema drives both the interactive `add` prompts
//! and the required-field validation performed before every backup.
//!
//! ```toml
//! [[field]]
//! key = "db_port"
//! prompt = "Port"
//! type = "int"
//! default = 3306
//! ```
//!
//! Fields without a `prompt` are filled in by the strategy itself (OAuth
//! credentials and tokens, for example).

use serde::Deserialize;
use serde_json::{Map, Value};

use super::types::StrategyKind;

/// Keys every alias namespace must carry regardless of type
pub const COMMON_FIELDS: [&str; 2] = ["backup_path", "type"];

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Invalid schema for '{kind}': {source}")]
    Parse {
        kind: StrategyKind,
        source: toml::de::Error,
    },

    #[error("Invalid value for '{key}': expected {expected}, got '{value}'")]
    InvalidAnswer {
        key: String,
        expected: &'static str,
        value: String,
    },

    #[error("A value for '{0}' is required")]
    Required(String),
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Int,
    Bool,
    List,
    Password,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Field {
    pub key: String,

    /// Prompt shown by the add flow; absent for strategy-managed fields
    #[serde(default)]
    pub prompt: Option<String>,

    #[serde(rename = "type", default)]
    pub field_type: FieldType,

    #[serde(default)]
    pub default: Option<toml::Value>,

    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl Field {
    /// Default value converted to its JSON form
    pub fn default_value(&self) -> Option<Value> {
        self.default
            .as_ref()
            .and_then(|value| serde_json::to_value(value).ok())
    }

    /// Hint appended to the prompt, e.g. ` [3306]` or ` [y/N]`
    pub fn default_hint(&self) -> String {
        match (self.field_type, &self.default) {
            (FieldType::Bool, Some(toml::Value::Boolean(true))) => " [Y/n]".to_string(),
            (FieldType::Bool, _) => " [y/N]".to_string(),
            (FieldType::Password, _) | (FieldType::List, _) => String::new(),
            (_, Some(toml::Value::String(s))) => format!(" [{}]", s),
            (_, Some(other)) => format!(" [{}]", other),
            (_, None) => String::new(),
        }
    }

    /// Convert a raw answer into the stored JSON value
    ///
    /// A blank answer falls back to the default; `Ok(None)` means the field
    /// is left unset. Blank answers for required fields without a default
    /// are rejected.
    pub fn parse_answer(&self, answer: &str) -> Result<Option<Value>, SchemaError> {
        let answer = answer.trim();

        if answer.is_empty() {
            if let Some(default) = self.default_value() {
                return Ok(Some(default));
            }
            return match self.field_type {
                FieldType::Bool => Ok(Some(Value::Bool(false))),
                FieldType::List => Ok(Some(Value::Array(Vec::new()))),
                _ if self.required => Err(SchemaError::Required(self.key.clone())),
                _ => Ok(None),
            };
        }

        let value = match self.field_type {
            FieldType::String | FieldType::Password => Value::String(answer.to_string()),
            FieldType::Int => {
                let number: i64 = answer.parse().map_err(|_| SchemaError::InvalidAnswer {
                    key: self.key.clone(),
                    expected: "an integer",
                    value: answer.to_string(),
                })?;
                Value::from(number)
            }
            FieldType::Bool => Value::Bool(matches!(answer.to_lowercase().as_str(), "y" | "yes")),
            FieldType::List => Value::Array(
                answer
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| Value::String(item.to_string()))
                    .collect(),
            ),
        };

        Ok(Some(value))
    }
}

/// Field list for one strategy type
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schema {
    #[serde(rename = "field", default)]
    pub fields: Vec<Field>,
}

impl Schema {
    /// Load the embedded schema for `kind`
    pub fn for_kind(kind: StrategyKind) -> Result<Self, SchemaError> {
        toml::from_str(source_for(kind)).map_err(|source| SchemaError::Parse { kind, source })
    }

    /// Common fields followed by the schema's required keys
    pub fn required_keys(&self) -> Vec<&str> {
        COMMON_FIELDS
            .iter()
            .copied()
            .chain(
                self.fields
                    .iter()
                    .filter(|field| field.required)
                    .map(|field| field.key.as_str()),
            )
            .collect()
    }

    /// First required key that is absent, null or an empty string
    pub fn first_missing(&self, namespace: &Map<String, Value>) -> Option<String> {
        self.required_keys()
            .into_iter()
            .find(|key| match namespace.get(*key) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            })
            .map(str::to_string)
    }

    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.key == key)
    }
}

fn source_for(kind: StrategyKind) -> &'static str {
    match kind {
        StrategyKind::Github => include_str!("../../schemas/github.toml"),
        StrategyKind::Gist => include_str!("../../schemas/gist.toml"),
        StrategyKind::GooglePhotos => include_str!("../../schemas/googlephotos.toml"),
        StrategyKind::GoogleDrive => include_str!("../../schemas/googledrive.toml"),
        StrategyKind::Wordpress => include_str!("../../schemas/wordpress.toml"),
        StrategyKind::Dropbox => include_str!("../../schemas/dropbox.toml"),
        StrategyKind::Mysql => include_str!("../../schemas/mysql.toml"),
        StrategyKind::Server => include_str!("../../schemas/server.toml"),
        StrategyKind::Mongodb => include_str!("../../schemas/mongodb.toml"),
        StrategyKind::Postgresql => include_str!("../../schemas/postgresql.toml"),
    }
}
