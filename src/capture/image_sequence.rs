//! Replays a directory of still images as a looping video source

use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::capture::frame::{Frame, Orientation, PixelFormat};
use crate::capture::{CaptureConfig, CaptureDevice, CaptureError, FramePacer};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub struct ImageSequenceDevice {
    directory: PathBuf,
    name: String,
    files: Vec<PathBuf>,
    position: usize,
    config: Option<CaptureConfig>,
    pacer: FramePacer,
}

impl ImageSequenceDevice {
    pub fn new(directory: PathBuf) -> Self {
        let name = directory.display().to_string();
        Self {
            directory,
            name,
            files: Vec::new(),
            position: 0,
            config: None,
            pacer: FramePacer::new(0),
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> CaptureError {
        CaptureError::DeviceUnavailable {
            device: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn load(&self, path: &Path, config: &CaptureConfig) -> Option<Frame> {
        let image = match image::open(path) {
            Ok(image) => image,
            Err(e) => {
                warn!("Skipping {:?}: {}", path, e);
                return None;
            }
        };

        let mut rgba = image.to_rgba8();
        if rgba.dimensions() != (config.width, config.height) {
            rgba = image::imageops::resize(&rgba, config.width, config.height, FilterType::Triangle);
        }

        // Decoded files are already upright; the configured orientation describes a sensor
        let (width, height) = rgba.dimensions();
        Some(
            Frame::new(rgba.into_raw(), width, height)
                .with_format(PixelFormat::Rgba8)
                .with_orientation(Orientation::Up),
        )
    }
}

fn list_images(directory: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(directory)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

impl CaptureDevice for ImageSequenceDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, config: &CaptureConfig) -> Result<(), CaptureError> {
        if !self.directory.is_dir() {
            return Err(self.unavailable("not a directory"));
        }
        let files = list_images(&self.directory).map_err(|e| self.unavailable(e.to_string()))?;
        if files.is_empty() {
            return Err(self.unavailable("directory contains no images"));
        }
        if config.width == 0 || config.height == 0 {
            return Err(CaptureError::InputConfigurationFailed {
                device: self.name.clone(),
                reason: format!("invalid resolution {}x{}", config.width, config.height),
            });
        }

        debug!("Replaying {} image(s) from {}", files.len(), self.name);
        self.files = files;
        self.position = 0;
        self.pacer = FramePacer::new(config.max_fps);
        self.config = Some(config.clone());
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let Some(config) = self.config.clone() else {
            return Err(CaptureError::Read {
                device: self.name.clone(),
                reason: "device is not open".to_string(),
            });
        };

        // One full pass without a decodable file means the source is gone
        for _ in 0..self.files.len() {
            let path = self.files[self.position].clone();
            self.position = (self.position + 1) % self.files.len();
            if let Some(frame) = self.load(&path, &config) {
                self.pacer.wait();
                return Ok(Some(frame));
            }
        }

        Err(CaptureError::Read {
            device: self.name.clone(),
            reason: "no decodable images left".to_string(),
        })
    }

    fn close(&mut self) {
        self.config = None;
        self.files.clear();
    }
}
