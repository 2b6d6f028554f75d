use walrelay_core::{fold_case, ActionKind, Filter};

use crate::error::{ConfigError, ConfigResult};
use crate::relay::{FilterSection, RelayConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a relay configuration.
pub fn validate_config(config: &RelayConfig) -> ConfigResult<()> {
    validate_filter(&config.listener.filter)?;
    validate_publisher(config)?;
    validate_logger(config)?;
    Ok(())
}

fn validate_filter(filter: &FilterSection) -> ConfigResult<()> {
    for (table, actions) in &filter.tables {
        for action in actions {
            if !is_action_name(action) {
                return Err(ConfigError::InvalidAction {
                    table: table.clone(),
                    value: action.clone(),
                });
            }
        }
    }

    for (table, columns) in &filter.column_filter {
        // An unlisted table is always dropped, so its column rules could never apply.
        let folded = fold_case(table);
        if !filter
            .tables
            .keys()
            .any(|listed| fold_case(listed) == folded)
        {
            return Err(ConfigError::ColumnFilterWithoutTable {
                table: table.clone(),
            });
        }

        for (column, values) in columns {
            if values.is_empty() {
                return Err(ConfigError::EmptyAllowedValues {
                    table: table.clone(),
                    column: column.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Full action names only; the single-letter tags never appear in events.
fn is_action_name(value: &str) -> bool {
    value
        .parse::<ActionKind>()
        .is_ok_and(|kind| kind.as_str().eq_ignore_ascii_case(value))
}

fn validate_publisher(config: &RelayConfig) -> ConfigResult<()> {
    if config.publisher.topic.trim().is_empty() {
        return Err(ConfigError::EmptyTopic);
    }
    Ok(())
}

fn validate_logger(config: &RelayConfig) -> ConfigResult<()> {
    let level = config.logger.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::InvalidLogLevel {
            value: config.logger.level.clone(),
        });
    }
    Ok(())
}

/// Convert a validated filter section to a core [`Filter`].
pub fn to_filter(section: &FilterSection) -> ConfigResult<Filter> {
    validate_filter(section)?;
    Ok(Filter::new(
        section.tables.clone(),
        section.column_filter.clone(),
    ))
}
