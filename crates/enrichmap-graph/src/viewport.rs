use enrichmap_core::{BoundingBox, Position};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomBounds {
    pub min: f64,
    pub max: f64,
    /// Zoom at which the whole graph fits the viewport.
    pub fit: f64,
}

/// Visible window onto model space. `pan` is the model point at the viewport origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub zoom: f64,
    pub pan: Position,
    bounds: Option<ZoomBounds>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1200.0, 800.0)
    }
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            zoom: 1.0,
            pan: Position::default(),
            bounds: None,
        }
    }

    pub fn bounds(&self) -> Option<ZoomBounds> {
        self.bounds
    }

    /// Zoom limits are lifted while a layout runs so the fit is unconstrained.
    pub fn clear_bounds(&mut self) {
        self.bounds = None;
    }

    /// Zoom and pan that show `bbox` with `padding` screen pixels on every side.
    pub fn fit_zoom(&self, bbox: &BoundingBox, padding: f64) -> f64 {
        let avail_w = (self.width - 2.0 * padding).max(1.0);
        let avail_h = (self.height - 2.0 * padding).max(1.0);
        let w = bbox.width().max(f64::EPSILON);
        let h = bbox.height().max(f64::EPSILON);
        (avail_w / w).min(avail_h / h)
    }

    pub fn fit(&mut self, bbox: &BoundingBox, padding: f64) {
        let zoom = self.fit_zoom(bbox, padding);
        self.zoom = self.clamp_zoom(zoom);
        self.center_on(bbox);
    }

    /// Fits `bbox`, then pins the zoom range to `[fraction * fit, max]`.
    pub fn tighten(
        &mut self,
        bbox: &BoundingBox,
        padding: f64,
        max_zoom: f64,
        min_fraction: f64,
    ) -> ZoomBounds {
        self.bounds = None;
        let fit = self.fit_zoom(bbox, padding);
        let bounds = ZoomBounds {
            min: (fit * min_fraction).min(max_zoom),
            max: max_zoom,
            fit,
        };
        self.bounds = Some(bounds);
        self.zoom = self.clamp_zoom(fit);
        self.center_on(bbox);
        bounds
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = self.clamp_zoom(zoom);
    }

    fn clamp_zoom(&self, zoom: f64) -> f64 {
        match self.bounds {
            Some(b) => zoom.clamp(b.min, b.max),
            None => zoom,
        }
    }

    fn center_on(&mut self, bbox: &BoundingBox) {
        let cx = (bbox.x1 + bbox.x2) / 2.0;
        let cy = (bbox.y1 + bbox.y2) / 2.0;
        self.pan = Position::new(
            cx - self.width / (2.0 * self.zoom),
            cy - self.height / (2.0 * self.zoom),
        );
    }
}
