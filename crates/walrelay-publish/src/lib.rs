mod error;
mod mock;
mod publisher;
mod relay;

pub use error::{PublishError, PublishResult};
pub use mock::MockPublisher;
pub use publisher::{prepare_message, Message, Publisher, StdoutPublisher, TopicRouter};
pub use relay::{relay, RelayStats};
