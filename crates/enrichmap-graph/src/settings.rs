use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Tunables of the interactive editor. Every field has a default so partial
/// JSON files are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    pub layout: LayoutSettings,
    pub clusters: ClusterSettings,
    pub overlay: OverlaySettings,
    pub history: HistorySettings,
}

impl EditorSettings {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    pub seed: u64,
    pub iterations: usize,
    pub node_repulsion: f64,
    pub gravity: f64,
    pub initial_temperature: f64,
    pub cooling_factor: f64,
    pub min_temperature: f64,
    /// Gap between disconnected nodes and between the grid and the main component.
    pub disconnected_spacing: f64,
    pub fit_padding: f64,
    pub max_zoom: f64,
    /// Minimum zoom as a fraction of the fit zoom.
    pub min_zoom_fraction: f64,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            iterations: 400,
            node_repulsion: 4500.0,
            gravity: 0.02,
            initial_temperature: 60.0,
            cooling_factor: 0.985,
            min_temperature: 0.05,
            disconnected_spacing: 20.0,
            fit_padding: 30.0,
            max_zoom: 2.0,
            min_zoom_fraction: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// Scale applied to child offsets on collapse; expand uses the reciprocal.
    pub shrink_factor: f64,
    /// Clusters with at least this many children never animate and use the slow overlay path.
    pub large_cluster_threshold: usize,
    pub animation_ms: u64,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            shrink_factor: 0.2,
            large_cluster_threshold: 33,
            animation_ms: 300,
        }
    }
}

impl ClusterSettings {
    pub fn animation_duration(&self) -> Duration {
        Duration::from_millis(self.animation_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub padding: f64,
    pub max_sampled_edges: usize,
    pub throttle_ms: u64,
    pub large_throttle_ms: u64,
    pub sample_seed: u64,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            padding: 10.0,
            max_sampled_edges: 300,
            throttle_ms: 50,
            large_throttle_ms: 250,
            sample_seed: 7,
        }
    }
}

impl OverlaySettings {
    pub fn throttle(&self, large: bool) -> Duration {
        Duration::from_millis(if large {
            self.large_throttle_ms
        } else {
            self.throttle_ms
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub capacity: usize,
    pub release_debounce_ms: u64,
    pub removal_debounce_ms: u64,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: 100,
            release_debounce_ms: 150,
            removal_debounce_ms: 100,
        }
    }
}

impl HistorySettings {
    pub fn release_window(&self) -> Duration {
        Duration::from_millis(self.release_debounce_ms)
    }

    pub fn removal_window(&self) -> Duration {
        Duration::from_millis(self.removal_debounce_ms)
    }
}
