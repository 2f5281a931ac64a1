// Store module — message persistence and session reconstruction

mod messages;
mod schema;
mod types;

pub use messages::MessageStore;
pub use types::{MessageRecord, NewMessage, Role, SessionSummary};
