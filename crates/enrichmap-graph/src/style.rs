//! Network Style System
//!
//! Node sizing and the NES colour scheme shared by overlays and export.

use serde::{Deserialize, Serialize};

/// RGBA color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(&self, a: u8) -> Self {
        Self { a, ..*self }
    }

    pub fn to_tuple(&self) -> (u8, u8, u8, u8) {
        (self.r, self.g, self.b, self.a)
    }

    pub fn darken(&self, factor: f32) -> Self {
        Self {
            r: ((self.r as f32) * (1.0 - factor)) as u8,
            g: ((self.g as f32) * (1.0 - factor)) as u8,
            b: ((self.b as f32) * (1.0 - factor)) as u8,
            a: self.a,
        }
    }

    /// Linear blend toward `other`; `t` is clamped to [0, 1].
    pub fn mix(&self, other: Color, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        let channel = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Self {
            r: channel(self.r, other.r),
            g: channel(self.g, other.g),
            b: channel(self.b, other.b),
            a: channel(self.a, other.a),
        }
    }

    /// `#rrggbb` form used in SVG output.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn opacity(&self) -> f64 {
        self.a as f64 / 255.0
    }
}

pub const POSITIVE_NES: Color = Color::rgb(178, 24, 43);
pub const NEGATIVE_NES: Color = Color::rgb(33, 102, 172);
pub const NEUTRAL_NES: Color = Color::rgb(247, 247, 247);
pub const EDGE_COLOR: Color = Color::rgb(27, 158, 119);
pub const LABEL_COLOR: Color = Color::rgb(33, 33, 33);

/// NES magnitude mapped to full colour saturation.
pub const NES_COLOR_RANGE: f64 = 3.0;

pub const MIN_NODE_DIAMETER: f64 = 12.0;
pub const MAX_NODE_DIAMETER: f64 = 60.0;
pub const LABEL_CHAR_WIDTH: f64 = 6.5;
pub const LABEL_HEIGHT: f64 = 14.0;

/// Fill and stroke of one cluster hull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayColors {
    pub fill: Color,
    pub stroke: Color,
}

/// Node fill interpolated from white toward the NES sign colour.
pub fn nes_color(nes: f64) -> Color {
    let t = (nes.abs() / NES_COLOR_RANGE).min(1.0);
    if nes >= 0.0 {
        NEUTRAL_NES.mix(POSITIVE_NES, t)
    } else {
        NEUTRAL_NES.mix(NEGATIVE_NES, t)
    }
}

/// Two-tone hull colour: only the sign of the average NES matters.
pub fn cluster_colors(average_nes: f64) -> OverlayColors {
    let base = if average_nes >= 0.0 {
        POSITIVE_NES
    } else {
        NEGATIVE_NES
    };
    OverlayColors {
        fill: base.with_alpha(40),
        stroke: base.with_alpha(160),
    }
}

pub fn node_diameter(gene_set_size: u32) -> f64 {
    (MIN_NODE_DIAMETER + 2.0 * (gene_set_size as f64).sqrt()).clamp(MIN_NODE_DIAMETER, MAX_NODE_DIAMETER)
}

pub fn label_width(label: &str) -> f64 {
    label.chars().count() as f64 * LABEL_CHAR_WIDTH
}

/// Width and height of a node's bounding box including its label underneath.
pub fn node_extent(gene_set_size: u32, label: &str) -> (f64, f64) {
    let diameter = node_diameter(gene_set_size);
    (diameter.max(label_width(label)), diameter + LABEL_HEIGHT)
}

pub fn edge_width(similarity: f64) -> f64 {
    1.0 + 7.0 * similarity.clamp(0.0, 1.0)
}
