pub mod agent;
pub mod cleaner;
pub mod error;
pub mod resolver;
pub mod smtp;

pub use agent::{run_worker, DeliveryAgentConfig};
pub use cleaner::RetentionCleanerConfig;
pub use error::{PermanentFailure, SendError, TemporaryFailure};
pub use resolver::{HickoryMxResolver, MxResolver, StaticMxResolver};
pub use smtp::{ScriptedOutcome, SmtpClient, StaticSmtpClient, TcpSmtpClient};
