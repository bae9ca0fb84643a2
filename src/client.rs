//! The edge client instance owned by the process entry point

use parking_lot::Mutex;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::Result;
use crate::report::ReportSender;
use crate::vision::{create_capture_source, CapturePipeline, ImageStore, InferenceAdapter};

/// Connection manager wired to the capture pipeline its receivers trigger.
/// The pipeline lives in the trigger callback until shutdown.
pub struct EdgeClient {
    manager: ConnectionManager,
}

impl EdgeClient {
    /// Build every component from configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let manager = ConnectionManager::new(config.server.clone());

        let source = create_capture_source(&config.capture)?;
        let store = ImageStore::from_config(&config.storage);
        let adapter = InferenceAdapter::from_config(&config.detector);
        let sender = ReportSender::new(Arc::new(manager.clone()));

        let pipeline = CapturePipeline::new(source, store, adapter, sender);
        Ok(Self::with_pipeline(manager, pipeline))
    }

    /// Wire an existing manager and pipeline together
    pub fn with_pipeline(manager: ConnectionManager, pipeline: CapturePipeline) -> Self {
        let pipeline = Mutex::new(pipeline);

        manager.set_trigger_callback(move || pipeline.lock().on_trigger());
        manager.set_message_callback(|text| log::info!("{}", text));

        Self { manager }
    }

    /// Connect (or start retrying in the background)
    pub fn start(&self) -> bool {
        self.manager.start()
    }

    pub fn shutdown(&self) {
        self.manager.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.manager.is_running()
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }
}

impl Drop for EdgeClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
