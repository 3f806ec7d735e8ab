pub mod connection;
pub mod errors;
pub mod hub;
pub mod ratelimit;

pub use connection::{Connection, ConnectionError};
pub use errors::{HubError, WsError};
pub use hub::{HandlerTable, Hub, HubOptions, MessageHandler, SessionDocument};
pub use ratelimit::{RateLimitedAction, RateLimiter};
