use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::TextLayerError;
use crate::geometry::normalize_rotation;
use crate::layout::DEFAULT_CHAR_WIDTH_RATIO;
use crate::search::SearchOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Quiet period before an edited query is re-matched.
    pub debounce_ms: u64,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub span_fragments: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            case_sensitive: false,
            whole_word: false,
            span_fragments: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub char_width_ratio: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            char_width_ratio: DEFAULT_CHAR_WIDTH_RATIO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub scale: f32,
    pub rotation: i32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextLayerConfig {
    pub search: SearchConfig,
    pub layout: LayoutConfig,
    pub view: ViewConfig,
}

impl TextLayerConfig {
    pub const FILE_NAME: &'static str = "textlayer.toml";

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).context("failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&source).with_context(|| format!("invalid config file {:?}", path))
    }

    pub fn validate(&self) -> Result<(), TextLayerError> {
        if !self.view.scale.is_finite() || self.view.scale <= 0.0 {
            return Err(TextLayerError::InvalidScale(self.view.scale));
        }
        let ratio = self.layout.char_width_ratio;
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(TextLayerError::InvalidCharWidthRatio(ratio));
        }
        normalize_rotation(self.view.rotation)?;
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.search.debounce_ms)
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            case_sensitive: self.search.case_sensitive,
            whole_word: self.search.whole_word,
            span_fragments: self.search.span_fragments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = TextLayerConfig::from_toml_str(
            r#"
            [search]
            debounce_ms = 50
            whole_word = true
            "#,
        )
        .unwrap();
        assert_eq!(config.search.debounce_ms, 50);
        assert!(config.search.whole_word);
        assert!(config.search.span_fragments);
        assert_eq!(config.layout, LayoutConfig::default());
        assert_eq!(config.debounce(), Duration::from_millis(50));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = TextLayerConfig::load(&dir.path().join(TextLayerConfig::FILE_NAME)).unwrap();
        assert_eq!(config, TextLayerConfig::default());
    }

    #[test]
    fn file_on_disk_is_loaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TextLayerConfig::FILE_NAME);
        std::fs::write(&path, "[view]\nscale = 1.5\nrotation = 270\n").unwrap();
        let config = TextLayerConfig::load(&path).unwrap();
        assert_eq!(config.view.scale, 1.5);
        assert_eq!(config.view.rotation, 270);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(TextLayerConfig::from_toml_str("[view]\nrotation = 45\n").is_err());
        assert!(TextLayerConfig::from_toml_str("[view]\nscale = 0.0\n").is_err());
        assert!(TextLayerConfig::from_toml_str("[layout]\nchar_width_ratio = -1.0\n").is_err());
        assert!(TextLayerConfig::from_toml_str("[search]\ndebounce_ms = \"soon\"\n").is_err());
    }
}
