pub mod messages;
pub mod subscriber;

pub use messages::{parse_register, parse_unregister, MalformedMessage, RegistryMessage, StartMessage};
pub use subscriber::{Subscriber, SubscriberOptions};
