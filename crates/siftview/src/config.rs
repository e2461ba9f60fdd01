//! Declarative view configuration loaded from TOML.
//!
//! A [`ViewConfig`] names a filter and a sort in data, so a view can be
//! restored from a file instead of code. Filters built from configuration
//! work on named record fields through [`Record::field`].
//!
//! # Example
//!
//! ```toml
//! sort_key = "title"
//! sort_reverse = true
//!
//! [filter]
//! kind = "and"
//! all = [
//!     { kind = "starts_with", key = "title", prefix = "Sp" },
//!     { kind = "partial_date", key = "created", year = 2024 },
//! ]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use siftview_core::logging::targets;

use crate::error::ConfigError;
use crate::predicate::Predicate;
use crate::record::{Record, Value};
use crate::sort::SortSpec;

/// Serializable filter and sort settings for a view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Field to sort on; `None` keeps source order.
    pub sort_key: Option<String>,
    /// Sort descending.
    pub sort_reverse: bool,
    /// Filter to apply; `None` lets every record through.
    pub filter: Option<PredicateConfig>,
}

impl ViewConfig {
    /// Parses a configuration from a TOML string.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(target: targets::CONFIG, path = %path.display(), "loaded view configuration");
        Ok(config)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Checks every partial-date filter for impossible months and days.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.filter {
            Some(filter) => filter.validate(),
            None => Ok(()),
        }
    }

    /// Builds the configured filter.
    pub fn filter_predicate<T: Record>(&self) -> Result<Option<Predicate<T>>, ConfigError> {
        self.filter.as_ref().map(PredicateConfig::to_predicate).transpose()
    }

    /// Builds the configured sort.
    pub fn sort_spec<T: Record>(&self) -> Option<SortSpec<T>> {
        self.sort_key
            .as_ref()
            .map(|key| SortSpec::by_field(key.clone()).reversed(self.sort_reverse))
    }
}

/// A filter expressed as data. Mirrors the field-based [`Predicate`]
/// variants; custom closures have no configuration form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredicateConfig {
    /// Every record passes.
    All,
    /// No record passes.
    Nothing,
    /// Every child must pass.
    And { all: Vec<PredicateConfig> },
    /// At least one child must pass.
    Or { any: Vec<PredicateConfig> },
    /// Inverts the child.
    Not { predicate: Box<PredicateConfig> },
    /// Field equals a value.
    Eq { key: String, value: ConfigValue },
    /// Field is missing or differs from a value.
    NotEq { key: String, value: ConfigValue },
    /// Text field starts with a prefix.
    StartsWith { key: String, prefix: String },
    /// Case-insensitive substring search across fields.
    TextSearch { keys: Vec<String>, text: String },
    /// Date field matches the given parts.
    PartialDate {
        key: String,
        year: Option<i32>,
        month: Option<u32>,
        day: Option<u32>,
    },
}

impl PredicateConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            PredicateConfig::And { all: children } | PredicateConfig::Or { any: children } => {
                children.iter().try_for_each(PredicateConfig::validate)
            }
            PredicateConfig::Not { predicate } => predicate.validate(),
            PredicateConfig::PartialDate { key, month, day, .. } => {
                if let Some(month) = *month {
                    if !(1..=12).contains(&month) {
                        return Err(ConfigError::InvalidDatePart {
                            key: key.clone(),
                            part: "month",
                            value: month,
                        });
                    }
                }
                if let Some(day) = *day {
                    if !(1..=31).contains(&day) {
                        return Err(ConfigError::InvalidDatePart {
                            key: key.clone(),
                            part: "day",
                            value: day,
                        });
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Builds the predicate this configuration describes.
    pub fn to_predicate<T: Record>(&self) -> Result<Predicate<T>, ConfigError> {
        self.validate()?;
        Ok(self.build())
    }

    fn build<T: Record>(&self) -> Predicate<T> {
        match self {
            PredicateConfig::All => Predicate::all(),
            PredicateConfig::Nothing => Predicate::none(),
            PredicateConfig::And { all } => Predicate::and(all.iter().map(Self::build).collect()),
            PredicateConfig::Or { any } => Predicate::or(any.iter().map(Self::build).collect()),
            PredicateConfig::Not { predicate } => predicate.build().negate(),
            PredicateConfig::Eq { key, value } => Predicate::eq(key.clone(), value.clone()),
            PredicateConfig::NotEq { key, value } => Predicate::not_eq(key.clone(), value.clone()),
            PredicateConfig::StartsWith { key, prefix } => {
                Predicate::starts_with(key.clone(), prefix.clone())
            }
            PredicateConfig::TextSearch { keys, text } => {
                Predicate::text_search(keys.iter().cloned(), text.clone())
            }
            PredicateConfig::PartialDate {
                key,
                year,
                month,
                day,
            } => Predicate::partial_date(key.clone(), *year, *month, *day),
        }
    }
}

/// A literal value in a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<ConfigValue> for Value {
    fn from(value: ConfigValue) -> Self {
        match value {
            ConfigValue::Bool(b) => Value::Bool(b),
            ConfigValue::Int(i) => Value::Int(i),
            ConfigValue::Float(f) => Value::Float(f),
            ConfigValue::Text(s) => Value::Text(s),
        }
    }
}
