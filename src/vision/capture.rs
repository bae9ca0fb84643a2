//! Camera capture sources

use image::DynamicImage;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::{CaptureConfig, CaptureSourceKind};
use crate::error::{ClientError, Result};

/// Image extensions a frame directory may contain
const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// A camera with an open / read / release lifecycle
pub trait CaptureSource: Send {
    /// Short description for logs
    fn name(&self) -> &str;

    /// Acquire the device. Fails with `CaptureUnavailable` if it cannot be
    /// opened.
    fn open(&mut self) -> Result<()>;

    /// Read one frame. `Ok(None)` means the device is open but gave nothing.
    fn read(&mut self) -> Result<Option<DynamicImage>>;

    /// Give the device back
    fn release(&mut self);
}

/// Open, read one frame, release. The source is released on every path.
pub fn grab_frame(source: &mut dyn CaptureSource) -> Result<DynamicImage> {
    source.open()?;
    let frame = source.read();
    source.release();

    match frame? {
        Some(frame) => Ok(frame),
        None => Err(ClientError::CaptureUnavailable(format!(
            "{} returned no frame",
            source.name()
        ))),
    }
}

/// Build the source selected in the config
pub fn create_capture_source(config: &CaptureConfig) -> Result<Box<dyn CaptureSource>> {
    match config.source {
        CaptureSourceKind::Command => Ok(Box::new(CommandCapture::from_config(config))),
        CaptureSourceKind::Directory => {
            let dir = config.directory.as_ref().ok_or_else(|| {
                ClientError::Config("capture.directory is required for directory sources".into())
            })?;
            let source = FrameSequenceCapture::from_directory(dir, config.loop_playback)?;
            Ok(Box::new(source))
        }
    }
}

/// Grabs a still through an external program (`fswebcam` by default)
#[derive(Debug, Clone)]
pub struct CommandCapture {
    program: String,
    args: Vec<String>,
    device: Option<PathBuf>,
    output: PathBuf,
    opened: bool,
}

impl CommandCapture {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            device: None,
            output: std::env::temp_dir().join(format!("safestep-frame-{}.jpg", std::process::id())),
            opened: false,
        }
    }

    pub fn with_device(mut self, device: impl Into<PathBuf>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Where the grabber writes its frame
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        let mut capture = Self::new(config.program.clone(), config.args.clone());
        capture.device = config.device.clone();
        capture
    }

    fn expand_args(&self) -> Vec<String> {
        let device = self
            .device
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        let output = self.output.display().to_string();

        self.args
            .iter()
            .map(|arg| arg.replace("{device}", &device).replace("{output}", &output))
            .collect()
    }

    fn remove_output(&self) {
        if let Err(e) = std::fs::remove_file(&self.output) {
            if e.kind() != io::ErrorKind::NotFound {
                log::debug!("Could not remove {}: {}", self.output.display(), e);
            }
        }
    }
}

impl CaptureSource for CommandCapture {
    fn name(&self) -> &str {
        &self.program
    }

    fn open(&mut self) -> Result<()> {
        if let Some(device) = &self.device {
            if !device.exists() {
                return Err(ClientError::CaptureUnavailable(format!(
                    "video device {} not found",
                    device.display()
                )));
            }
        }
        self.opened = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<DynamicImage>> {
        if !self.opened {
            return Err(ClientError::CaptureUnavailable("camera not opened".into()));
        }

        self.remove_output();
        let status = Command::new(&self.program)
            .args(self.expand_args())
            .status()
            .map_err(|e| ClientError::CaptureUnavailable(format!("{}: {}", self.program, e)))?;

        if !status.success() {
            log::warn!("{} exited with {}", self.program, status);
            return Ok(None);
        }

        match image::open(&self.output) {
            Ok(frame) => Ok(Some(frame)),
            Err(e) => {
                log::warn!("{} produced no readable frame: {}", self.program, e);
                Ok(None)
            }
        }
    }

    fn release(&mut self) {
        self.remove_output();
        self.opened = false;
    }
}

/// Replays image files from a directory, in name order
#[derive(Debug, Clone)]
pub struct FrameSequenceCapture {
    name: String,
    frames: Vec<PathBuf>,
    index: usize,
    loop_playback: bool,
}

impl FrameSequenceCapture {
    pub fn from_directory(dir: impl AsRef<Path>, loop_playback: bool) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            ClientError::CaptureUnavailable(format!("{}: {}", dir.display(), e))
        })?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_frame_extension(path))
            .collect();
        frames.sort();

        log::info!("Frame sequence {}: {} frames", dir.display(), frames.len());

        Ok(Self {
            name: dir.display().to_string(),
            frames,
            index: 0,
            loop_playback,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl CaptureSource for FrameSequenceCapture {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<()> {
        if self.frames.is_empty() {
            return Err(ClientError::CaptureUnavailable(format!(
                "no frames in {}",
                self.name
            )));
        }
        Ok(())
    }

    fn read(&mut self) -> Result<Option<DynamicImage>> {
        if self.index >= self.frames.len() {
            if !self.loop_playback || self.frames.is_empty() {
                return Ok(None);
            }
            self.index = 0;
        }

        let path = &self.frames[self.index];
        self.index += 1;

        match image::open(path) {
            Ok(frame) => Ok(Some(frame)),
            Err(e) => {
                log::warn!("Skipping unreadable frame {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn release(&mut self) {}
}

fn has_frame_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
