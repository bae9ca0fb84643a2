//! Capture → analyze → report, once per trigger

use image::DynamicImage;
use std::path::{Path, PathBuf};

use super::capture::{grab_frame, CaptureSource};
use super::wear::InferenceAdapter;
use crate::config::StorageConfig;
use crate::error::{ClientError, Result};
use crate::protocol::{unix_timestamp, OutboundReport};
use crate::report::ReportSender;

/// Files written for one captured frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    /// Path the server knows the raw frame by (goes into the report)
    pub report_path: String,
    /// Raw frame on local storage
    pub raw_path: PathBuf,
    /// Grayscale copy next to it
    pub gray_path: PathBuf,
}

/// Shared image storage. The server sees `local_root` as `report_prefix`.
#[derive(Debug, Clone)]
pub struct ImageStore {
    local_root: PathBuf,
    report_prefix: String,
}

impl ImageStore {
    pub fn new(local_root: impl Into<PathBuf>, report_prefix: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            report_prefix: report_prefix.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.local_root.clone(), config.report_prefix.clone())
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// Write `captured_{ts}.jpg` and `captured_{ts}_gray.jpg`
    pub fn persist(&self, frame: &DynamicImage, timestamp: u64) -> Result<CaptureResult> {
        std::fs::create_dir_all(&self.local_root).map_err(|e| {
            ClientError::CaptureUnavailable(format!(
                "cannot create {}: {}",
                self.local_root.display(),
                e
            ))
        })?;

        let filename = format!("captured_{}.jpg", timestamp);
        let raw_path = self.local_root.join(&filename);
        let gray_path = self
            .local_root
            .join(format!("captured_{}_gray.jpg", timestamp));

        frame
            .to_rgb8()
            .save(&raw_path)
            .map_err(|e| save_error(&raw_path, e))?;
        frame
            .to_luma8()
            .save(&gray_path)
            .map_err(|e| save_error(&gray_path, e))?;

        Ok(CaptureResult {
            report_path: self.report_path(&filename),
            raw_path,
            gray_path,
        })
    }

    /// Server-relative path for a file in the store
    pub fn report_path(&self, filename: &str) -> String {
        let prefix = self.report_prefix.as_str();
        if prefix.is_empty() || prefix.ends_with('/') {
            format!("{}{}", prefix, filename)
        } else {
            format!("{}/{}", prefix, filename)
        }
    }

    /// Map a server-relative path back onto local storage
    pub fn resolve_local(&self, report_path: &str) -> PathBuf {
        let prefix = self.report_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return self.local_root.join(report_path);
        }
        match report_path.strip_prefix(prefix) {
            Some(rest) => self.local_root.join(rest.trim_start_matches('/')),
            None => PathBuf::from(report_path),
        }
    }
}

fn save_error(path: &Path, e: image::ImageError) -> ClientError {
    ClientError::CaptureUnavailable(format!("cannot write {}: {}", path.display(), e))
}

/// Runs one capture cycle per trigger
pub struct CapturePipeline {
    source: Box<dyn CaptureSource>,
    store: ImageStore,
    adapter: InferenceAdapter,
    sender: ReportSender,
}

impl CapturePipeline {
    pub fn new(
        source: Box<dyn CaptureSource>,
        store: ImageStore,
        adapter: InferenceAdapter,
        sender: ReportSender,
    ) -> Self {
        Self {
            source,
            store,
            adapter,
            sender,
        }
    }

    /// Grab one frame and persist it
    pub fn capture(&mut self) -> Result<CaptureResult> {
        let frame = grab_frame(self.source.as_mut())?;
        let result = self.store.persist(&frame, unix_timestamp())?;
        log::info!(
            "Captured {} ({}x{})",
            result.raw_path.display(),
            frame.width(),
            frame.height()
        );
        Ok(result)
    }

    /// Full cycle. Returns the report that was sent.
    pub fn run(&mut self) -> Result<OutboundReport> {
        let capture = self.capture()?;

        let image = self.store.resolve_local(&capture.report_path);
        let wear = self.adapter.estimate(&image);
        log::info!("Wear estimate for {}: {}%", capture.report_path, wear);

        let report = OutboundReport::now(capture.report_path, wear);
        self.sender.send(&report)?;
        Ok(report)
    }

    /// Trigger entry point: a failed cycle is logged and dropped
    pub fn on_trigger(&mut self) {
        match self.run() {
            Ok(_) => {}
            Err(ClientError::CaptureUnavailable(reason)) => {
                log::warn!("Capture unavailable, trigger dropped: {}", reason);
            }
            Err(e) => log::warn!("Capture cycle incomplete: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportTransport;
    use crate::vision::capture::FrameSequenceCapture;
    use crate::vision::detector::{Detection, DetectionEngine, DetectionError};
    use crate::vision::wear::FixedFallback;
    use image::{Rgb, RgbImage};
    use parking_lot::Mutex;
    use std::sync::Arc;

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

    struct Offline;

    impl ReportTransport for Offline {
        fn send_line(&self, _line: &str) -> Result<()> {
            Err(ClientError::NotConnected)
        }
    }

    struct WornEngine;

    impl DetectionEngine for WornEngine {
        fn detect(&self, image: &Path) -> std::result::Result<Vec<Detection>, DetectionError> {
            assert!(image.exists());
            Ok(vec![
                Detection::new("worn_80", 0.9),
                Detection::new("normal", 0.99),
            ])
        }
    }

    fn frames_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(16, 12, Rgb([200, 40, 40]))
            .save(dir.path().join("frame.png"))
            .unwrap();
        dir
    }

    fn pipeline(
        frames: &Path,
        storage: &Path,
        transport: Arc<dyn ReportTransport>,
    ) -> CapturePipeline {
        let source = FrameSequenceCapture::from_directory(frames, true).unwrap();
        let adapter = InferenceAdapter::new(Some(Box::new(WornEngine))).with_fallback(Box::new(
            FixedFallback {
                no_detections: 10.0,
                model_unavailable: 90.0,
                processing_error: 25.0,
            },
        ));
        CapturePipeline::new(
            Box::new(source),
            ImageStore::new(storage, "images/"),
            adapter,
            ReportSender::new(transport),
        )
    }

    #[test]
    fn test_report_path_and_resolution() {
        let store = ImageStore::new("/mnt/pi_nfs/Pictures/", "images/");
        let path = store.report_path("captured_1.jpg");
        assert_eq!(path, "images/captured_1.jpg");
        assert_eq!(
            store.resolve_local(&path),
            PathBuf::from("/mnt/pi_nfs/Pictures/captured_1.jpg")
        );

        let bare = ImageStore::new("/data", "images");
        assert_eq!(bare.report_path("x.jpg"), "images/x.jpg");
        assert_eq!(bare.resolve_local("images/x.jpg"), PathBuf::from("/data/x.jpg"));
        assert_eq!(bare.resolve_local("other/x.jpg"), PathBuf::from("other/x.jpg"));
    }

    #[test]
    fn test_persist_writes_raw_and_gray() {
        let storage = tempfile::tempdir().unwrap();
        let store = ImageStore::new(storage.path().join("nested"), "images/");
        let frame = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([10, 200, 30])));

        let result = store.persist(&frame, 1234).unwrap();
        assert_eq!(result.report_path, "images/captured_1234.jpg");
        assert!(result.raw_path.ends_with("captured_1234.jpg"));
        assert!(result.gray_path.ends_with("captured_1234_gray.jpg"));

        let gray = image::open(&result.gray_path).unwrap();
        assert_eq!(gray.color(), image::ColorType::L8);
        let raw = image::open(&result.raw_path).unwrap();
        assert_eq!(raw.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn test_cycle_sends_one_report() {
        let frames = frames_dir();
        let storage = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let mut pipeline = pipeline(frames.path(), storage.path(), transport.clone());

        let report = pipeline.run().unwrap();
        assert_eq!(report.wear.value(), 80.0);
        assert!(report.image_path.starts_with("images/captured_"));

        let lines = transport.lines.lock();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("[SERVER_SQL]:image_path:images/captured_"));
        assert!(lines[0].contains(" wear_percentage:80.0 timestamp:"));
        assert!(lines[0].ends_with('\n'));
    }

    #[test]
    fn test_capture_failure_sends_nothing() {
        let empty = tempfile::tempdir().unwrap();
        let storage = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let mut pipeline = pipeline(empty.path(), storage.path(), transport.clone());

        assert!(matches!(
            pipeline.run(),
            Err(ClientError::CaptureUnavailable(_))
        ));
        pipeline.on_trigger();
        assert!(transport.lines.lock().is_empty());
    }

    #[test]
    fn test_offline_send_is_reported_not_raised() {
        let frames = frames_dir();
        let storage = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(frames.path(), storage.path(), Arc::new(Offline));

        assert!(matches!(pipeline.run(), Err(ClientError::NotConnected)));
        pipeline.on_trigger();
    }
}
