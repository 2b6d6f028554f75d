mod error;
mod relay;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use relay::{
    resolve_env, FilterSection, ListenerSection, LoggerSection, PublisherSection, RelayConfig,
};
pub use validation::{to_filter, validate_config};
