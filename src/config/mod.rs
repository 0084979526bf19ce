//! Application Configuration
//!
//! User settings stored in TOML format. Every section falls back to its
//! defaults, so a config file only needs the values it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::frame::Orientation;
use crate::capture::{CaptureConfig, TEST_PATTERN_DEVICE};
use crate::overlay::widgets::{OutlineStyle, OutlineStyles};
use crate::vision::{DetectionOptions, DispatchLimits, FinderConfig};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Capture settings
    pub capture: CaptureSettings,
    /// Detection settings
    pub detection: DetectionSettings,
    /// Overlay settings
    pub overlay: OverlaySettings,
    /// Window settings
    pub view: ViewSettings,
}

/// Capture-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// "test-pattern" or a directory of images to replay
    pub device: String,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Capture FPS (0 = unpaced)
    pub max_fps: u32,
    /// Sensor orientation relative to upright
    pub orientation: Orientation,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: TEST_PATTERN_DEVICE.to_string(),
            width: 640,
            height: 480,
            max_fps: 30,
            orientation: Orientation::Up,
        }
    }
}

impl From<&CaptureSettings> for CaptureConfig {
    fn from(settings: &CaptureSettings) -> Self {
        CaptureConfig {
            device: settings.device.clone(),
            width: settings.width,
            height: settings.height,
            max_fps: settings.max_fps,
            orientation: settings.orientation,
        }
    }
}

/// Detection-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Ask the engine for per-character boxes
    pub report_character_boxes: bool,
    /// Maximum detections in flight (0 = unbounded)
    pub max_in_flight: usize,
    /// Stop waiting on a detection after this long (0 = never)
    pub stall_timeout_ms: u64,
    /// Threads available to the detection engine
    pub worker_threads: usize,
    /// Frames are downscaled to this size before detection
    pub max_dimension: u32,
    /// Largest gap inside a word, in glyph heights
    pub word_gap: f32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            report_character_boxes: true,
            max_in_flight: 1,
            stall_timeout_ms: 2000,
            worker_threads: 2,
            max_dimension: 480,
            word_gap: 0.8,
        }
    }
}

impl DetectionSettings {
    pub fn options(&self) -> DetectionOptions {
        DetectionOptions {
            report_character_boxes: self.report_character_boxes,
        }
    }

    pub fn limits(&self) -> DispatchLimits {
        DispatchLimits {
            max_in_flight: (self.max_in_flight > 0).then_some(self.max_in_flight),
            stall_timeout: (self.stall_timeout_ms > 0)
                .then(|| Duration::from_millis(self.stall_timeout_ms)),
        }
    }

    pub fn finder(&self) -> FinderConfig {
        FinderConfig {
            max_dimension: self.max_dimension,
            word_gap: self.word_gap,
            ..FinderConfig::default()
        }
    }
}

/// Stroke settings for one outline kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrokeSettings {
    /// RGBA color
    pub color: [u8; 4],
    /// Stroke width in points
    pub width: f32,
}

impl From<StrokeSettings> for OutlineStyle {
    fn from(settings: StrokeSettings) -> Self {
        OutlineStyle {
            color: settings.color,
            width: settings.width,
        }
    }
}

/// Overlay-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// Outlines shown at startup
    pub enabled: bool,
    /// Word outline stroke
    pub word: StrokeSettings,
    /// Character outline stroke
    pub character: StrokeSettings,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        let styles = OutlineStyles::default();
        Self {
            enabled: true,
            word: StrokeSettings {
                color: styles.word.color,
                width: styles.word.width,
            },
            character: StrokeSettings {
                color: styles.character.color,
                width: styles.character.width,
            },
        }
    }
}

impl OverlaySettings {
    pub fn styles(&self) -> OutlineStyles {
        OutlineStyles {
            word: self.word.into(),
            character: self.character.into(),
        }
    }
}

/// Window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    /// Window title
    pub title: String,
    /// Initial window size (also the headless surface size)
    pub width: f32,
    pub height: f32,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            title: "textlens".to_string(),
            width: 960.0,
            height: 720.0,
        }
    }
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "textlens", "textlens")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        // Check capture defaults
        assert_eq!(config.capture.device, TEST_PATTERN_DEVICE);
        assert_eq!(config.capture.max_fps, 30);
        assert_eq!(config.capture.orientation, Orientation::Up);

        // Check detection defaults
        assert!(config.detection.report_character_boxes);
        assert_eq!(config.detection.max_in_flight, 1);
        assert_eq!(config.detection.stall_timeout_ms, 2000);

        // Check overlay defaults
        assert!(config.overlay.enabled);
        assert_eq!(config.overlay.word.color, [255, 0, 0, 255]);
        assert!(config.overlay.word.width > config.overlay.character.width);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.capture.device = "/data/frames".to_string();
        config.capture.orientation = Orientation::Right;
        config.detection.max_in_flight = 0;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.capture.device, "/data/frames");
        assert_eq!(parsed.capture.orientation, Orientation::Right);
        assert_eq!(parsed.detection.max_in_flight, 0);
        assert_eq!(parsed.overlay.character.color, config.overlay.character.color);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [capture]
            orientation = "left"

            [detection]
            max_in_flight = 3
            "#,
        )
        .unwrap();

        assert_eq!(parsed.capture.orientation, Orientation::Left);
        assert_eq!(parsed.capture.width, 640);
        assert_eq!(parsed.detection.max_in_flight, 3);
        assert!(parsed.detection.report_character_boxes);
        assert_eq!(parsed.view.title, "textlens");
    }

    #[test]
    fn test_detection_limits_conversion() {
        let mut settings = DetectionSettings::default();
        assert_eq!(settings.limits(), DispatchLimits::default());

        settings.max_in_flight = 0;
        settings.stall_timeout_ms = 0;
        assert_eq!(settings.limits(), DispatchLimits::unbounded());
    }

    #[test]
    fn test_overlay_settings_to_styles() {
        let settings = OverlaySettings::default();
        assert_eq!(settings.styles(), OutlineStyles::default());
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();
        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(config.capture.max_fps, loaded.capture.max_fps);
        assert_eq!(config.detection.worker_threads, loaded.detection.worker_threads);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
