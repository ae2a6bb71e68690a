//! TCP chat server implementation.

mod broadcast;
mod handler;
mod registry;
mod runner;

pub use broadcast::Broadcaster;
pub use registry::{DeliveryError, Session, SessionRegistry, SessionSender};
pub use runner::ChatServer;
