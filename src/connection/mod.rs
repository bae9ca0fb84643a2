//! Control channel
//!
//! - `ConnectionManager` - socket lifecycle, identification and reconnect
//!   supervision
//! - `MessageReceiver` - one blocking receive loop per live connection
//! - `ConnectionState` - Disconnected / Connecting / Connected / Reconnecting

pub mod events;
mod manager;
mod receiver;
mod state;

pub use events::{MessageCallback, MessageHandlers, TriggerCallback};
pub use manager::ConnectionManager;
pub use state::ConnectionState;
