use enrichmap_graph::Color;
use serde::{Deserialize, Serialize};

/// One raster size in the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    pub name: String,
    pub scale: f32,
}

impl ImageSize {
    pub fn new(name: impl Into<String>, scale: f32) -> Self {
        Self {
            name: name.into(),
            scale,
        }
    }

    pub fn file_name(&self) -> String {
        format!("images/enrichment_map_{}.png", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub device_pixel_ratio: f32,
    pub sizes: Vec<ImageSize>,
    pub background: Color,
    /// Model-space margin around the network.
    pub padding: f64,
    /// Largest width or height of a rendered image, in pixels.
    pub max_dimension: u32,
    /// Prefix of the permalink written into the README.
    pub base_url: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            device_pixel_ratio: 1.0,
            sizes: vec![
                ImageSize::new("small", 0.5),
                ImageSize::new("medium", 1.0),
                ImageSize::new("large", 2.0),
            ],
            background: Color::WHITE,
            padding: 20.0,
            max_dimension: 16_384,
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

impl ExportSettings {
    pub fn permalink(&self, net_id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), net_id)
    }
}
