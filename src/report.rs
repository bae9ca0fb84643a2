//! Result reporting over the control channel

use std::sync::Arc;

use crate::error::{ClientError, Result};
use crate::protocol::OutboundReport;

/// Something that can put one line on the wire
pub trait ReportTransport: Send + Sync {
    /// Write `line` to the active connection. Fails with
    /// [`ClientError::NotConnected`] when there is none.
    fn send_line(&self, line: &str) -> Result<()>;
}

/// Sends wear reports. Best effort: one attempt per report, nothing is
/// buffered or retried.
pub struct ReportSender {
    transport: Arc<dyn ReportTransport>,
}

impl ReportSender {
    pub fn new(transport: Arc<dyn ReportTransport>) -> Self {
        Self { transport }
    }

    pub fn send(&self, report: &OutboundReport) -> Result<()> {
        match self.transport.send_line(&report.to_line()) {
            Ok(()) => {
                log::info!("Report sent: {}", report);
                Ok(())
            }
            Err(ClientError::NotConnected) => {
                log::warn!("Not connected, report for {} dropped", report.image_path);
                Err(ClientError::NotConnected)
            }
            Err(e) => {
                log::error!("Report for {} not delivered: {}", report.image_path, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::connection::ConnectionManager;
    use crate::protocol::WearEstimate;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        lines: Mutex<Vec<String>>,
    }

    impl ReportTransport for RecordingTransport {
        fn send_line(&self, line: &str) -> Result<()> {
            self.lines.lock().push(line.to_string());
            Ok(())
        }
    }

    struct BrokenTransport;

    impl ReportTransport for BrokenTransport {
        fn send_line(&self, _line: &str) -> Result<()> {
            Err(ClientError::Send("broken pipe".to_string()))
        }
    }

    #[test]
    fn test_send_writes_one_line() {
        let transport = Arc::new(RecordingTransport::default());
        let sender = ReportSender::new(transport.clone());

        let report = OutboundReport::new("images/a.jpg", WearEstimate::new(42.0), 1000);
        sender.send(&report).unwrap();

        assert_eq!(
            *transport.lines.lock(),
            vec!["[SERVER_SQL]:image_path:images/a.jpg wear_percentage:42.0 timestamp:1000\n"]
        );
    }

    #[test]
    fn test_send_without_connection_reports_failure() {
        let mut config = ServerConfig::default();
        config.host = "127.0.0.1".to_string();
        let manager = ConnectionManager::new(config);
        let sender = ReportSender::new(Arc::new(manager));

        let report = OutboundReport::new("images/a.jpg", WearEstimate::new(42.0), 1000);
        let result = sender.send(&report);
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[test]
    fn test_write_error_is_returned() {
        let sender = ReportSender::new(Arc::new(BrokenTransport));
        let report = OutboundReport::new("images/a.jpg", WearEstimate::new(10.0), 1);
        assert!(matches!(sender.send(&report), Err(ClientError::Send(_))));
    }
}
