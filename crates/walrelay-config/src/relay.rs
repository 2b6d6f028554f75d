use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// Relay configuration as parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Replication listener settings.
    #[serde(default)]
    pub listener: ListenerSection,
    /// Publisher settings.
    pub publisher: PublisherSection,
    /// Logging settings.
    #[serde(default)]
    pub logger: LoggerSection,
}

impl RelayConfig {
    /// Parse a relay config from a TOML string.
    pub fn parse(toml_str: &str) -> ConfigResult<Self> {
        let config: RelayConfig = toml::from_str(toml_str)?;
        Ok(config)
    }

    /// Replace `${VAR}` references in the publisher section with values
    /// from the environment.
    pub fn resolve_env(&mut self) -> ConfigResult<()> {
        self.publisher.topic = resolve_env(&self.publisher.topic)?;
        self.publisher.topic_prefix = resolve_env(&self.publisher.topic_prefix)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListenerSection {
    /// `{schema}_{table}` to topic name overrides.
    #[serde(default)]
    pub topics_map: HashMap<String, String>,
    #[serde(default)]
    pub filter: FilterSection,
}

/// Table/action and column-value allow-lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterSection {
    /// Table name to allowed actions. Tables not listed are dropped.
    #[serde(default)]
    pub tables: HashMap<String, Vec<String>>,
    /// Table name to column name to allowed values.
    #[serde(default)]
    pub column_filter: HashMap<String, HashMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherSection {
    /// Base topic; event topics are `{topic}.{topic_prefix}{name}`.
    pub topic: String,
    #[serde(default)]
    pub topic_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggerSection {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggerSection {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// Resolve `${VAR_NAME}` references in a string from the environment.
///
/// An unterminated `${` is kept as-is. A reference to an unset variable is
/// an error.
pub fn resolve_env(s: &str) -> ConfigResult<String> {
    resolve_with(s, |name| std::env::var(name).ok())
}

fn resolve_with<F>(s: &str, lookup: F) -> ConfigResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 2..start + len];
        let value = lookup(name).ok_or_else(|| ConfigError::MissingEnvVar {
            name: name.to_string(),
        })?;
        result.push_str(&rest[..start]);
        result.push_str(&value);
        rest = &rest[start + len + 1..];
    }

    result.push_str(rest);
    Ok(result)
}
