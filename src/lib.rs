//! SafeStep edge client
//!
//! Keeps a control-channel connection to the SafeStep relay server and, when
//! the trigger token arrives, captures a photo of the shoe sole, estimates
//! wear with an external detector and reports the result to the SQL sink.
//!
//! - [`ConnectionManager`] - socket lifecycle, identification, reconnects
//! - [`vision::CapturePipeline`] - capture → analyze → report for one trigger
//! - [`EdgeClient`] - wires both from a [`ClientConfig`]

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod report;
pub mod vision;

// Re-export commonly used types
pub use client::EdgeClient;
pub use config::ClientConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{ClientError, Result};
pub use protocol::{ClientIdentity, InboundMessage, OutboundReport, WearEstimate, TRIGGER_TOKEN};
pub use report::{ReportSender, ReportTransport};
