pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use bus::{EventBus, PublishReport, SubscriberError, Subscription};
pub use config::TriageConfig;
pub use error::{Result, TriageError};
pub use events::{Event, EventKind, EventStatus};
pub use types::*;
