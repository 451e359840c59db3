pub mod publisher;

pub use publisher::{AlertEvent, EventPublisher, PublishError, PublishedEvent};
