pub mod diagnostics;
pub mod error;
pub mod health;
pub mod messages;
pub mod participant;
pub mod ready;

pub use diagnostics::*;
pub use error::*;
pub use health::*;
pub use messages::*;
pub use participant::{Participant, Role, Tier};
pub use ready::*;
