//! Raster rendering: the network and its cluster overlays are drawn into two
//! separate pixmaps with the same transform, then composited.

use crate::error::ExportError;
use crate::scene::ExportScene;
use crate::settings::{ExportSettings, ImageSize};
use enrichmap_graph::{Color, PathSegment};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Stroke, Transform};
use tracing::debug;

const HULL_STROKE_WIDTH: f32 = 1.5;
const NODE_STROKE_WIDTH: f32 = 1.0;

/// Model-to-pixel mapping shared by the base and overlay layers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterFrame {
    pub width: u32,
    pub height: u32,
    pub transform: Transform,
}

impl RasterFrame {
    pub fn new(scene: &ExportScene, size: &ImageSize, settings: &ExportSettings) -> Result<Self, ExportError> {
        let bounds = scene.bounds.expand(settings.padding);
        let scale = size.scale * settings.device_pixel_ratio;
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ExportError::Render(format!(
                "invalid scale {} for {} image",
                scale, size.name
            )));
        }
        let width = (bounds.width() as f32 * scale).ceil();
        let height = (bounds.height() as f32 * scale).ceil();
        if width < 1.0 || height < 1.0 {
            return Err(ExportError::Render(format!(
                "{} image collapsed below 1px",
                size.name
            )));
        }
        if width > settings.max_dimension as f32 || height > settings.max_dimension as f32 {
            return Err(ExportError::Render(format!(
                "{} image of {}x{} exceeds {} px",
                size.name, width, height, settings.max_dimension
            )));
        }
        Ok(Self {
            width: width as u32,
            height: height as u32,
            transform: Transform::from_scale(scale, scale)
                .pre_translate(-bounds.x1 as f32, -bounds.y1 as f32),
        })
    }

    fn pixmap(&self) -> Result<Pixmap, ExportError> {
        Pixmap::new(self.width, self.height).ok_or_else(|| {
            ExportError::Render(format!(
                "failed to allocate {}x{} surface",
                self.width, self.height
            ))
        })
    }
}

fn paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

fn to_skia(color: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(color.r, color.g, color.b, color.a)
}

/// Background, edges, then node discs.
pub fn render_graph(scene: &ExportScene, frame: &RasterFrame, background: Color) -> Result<Pixmap, ExportError> {
    let mut pixmap = frame.pixmap()?;
    pixmap.fill(to_skia(background));

    for edge in &scene.edges {
        let mut pb = PathBuilder::new();
        pb.move_to(edge.from.x as f32, edge.from.y as f32);
        pb.line_to(edge.to.x as f32, edge.to.y as f32);
        let Some(path) = pb.finish() else {
            continue;
        };
        let stroke = Stroke {
            width: edge.width as f32,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint(edge.color), &stroke, frame.transform, None);
    }

    let outline = Stroke {
        width: NODE_STROKE_WIDTH,
        ..Stroke::default()
    };
    for node in &scene.nodes {
        let Some(path) =
            PathBuilder::from_circle(node.center.x as f32, node.center.y as f32, node.radius as f32)
        else {
            continue;
        };
        pixmap.fill_path(&path, &paint(node.fill), FillRule::Winding, frame.transform, None);
        pixmap.stroke_path(&path, &paint(node.fill.darken(0.3)), &outline, frame.transform, None);
    }
    Ok(pixmap)
}

/// Cluster hulls on a transparent layer.
pub fn render_overlay(scene: &ExportScene, frame: &RasterFrame) -> Result<Pixmap, ExportError> {
    let mut pixmap = frame.pixmap()?;
    let stroke = Stroke {
        width: HULL_STROKE_WIDTH,
        ..Stroke::default()
    };
    for hull in &scene.hulls {
        let mut pb = PathBuilder::new();
        for segment in &hull.segments {
            match segment {
                PathSegment::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
                PathSegment::QuadTo { ctrl, to } => {
                    pb.quad_to(ctrl.x as f32, ctrl.y as f32, to.x as f32, to.y as f32)
                }
                PathSegment::Close => pb.close(),
            }
        }
        let Some(path) = pb.finish() else {
            debug!("Skipping degenerate hull of {}", hull.cluster);
            continue;
        };
        pixmap.fill_path(
            &path,
            &paint(hull.colors.fill),
            FillRule::Winding,
            frame.transform,
            None,
        );
        pixmap.stroke_path(&path, &paint(hull.colors.stroke), &stroke, frame.transform, None);
    }
    Ok(pixmap)
}

/// Converts tiny-skia's premultiplied pixels into a straight-alpha image.
pub fn to_image(pixmap: &Pixmap) -> Result<RgbaImage, ExportError> {
    let mut bytes = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        bytes.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), bytes)
        .ok_or_else(|| ExportError::Render("pixel buffer size mismatch".to_string()))
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Renders the base graph and overlay layer at `size`, composites them and
/// returns PNG bytes.
pub fn create_network_image(
    scene: &ExportScene,
    size: &ImageSize,
    settings: &ExportSettings,
) -> Result<Vec<u8>, ExportError> {
    let frame = RasterFrame::new(scene, size, settings)?;
    let mut base = to_image(&render_graph(scene, &frame, settings.background)?)?;
    let overlay = to_image(&render_overlay(scene, &frame)?)?;
    image::imageops::overlay(&mut base, &overlay, 0, 0);
    debug!(
        "Rendered {} image at {}x{}",
        size.name, frame.width, frame.height
    );
    encode_png(&base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{SceneEdge, SceneNode};
    use enrichmap_core::{BoundingBox, NodeId, Position};
    use enrichmap_graph::style::{POSITIVE_NES, cluster_colors};
    use enrichmap_graph::{HullPath, convex_hull, smooth_closed_path};

    fn scene() -> ExportScene {
        let outline = convex_hull(&[
            Position::new(0.0, 0.0),
            Position::new(100.0, 0.0),
            Position::new(100.0, 100.0),
            Position::new(0.0, 100.0),
        ]);
        ExportScene {
            nodes: vec![SceneNode {
                id: NodeId::new("n"),
                center: Position::new(50.0, 50.0),
                radius: 10.0,
                fill: POSITIVE_NES,
                label: "N".into(),
            }],
            edges: vec![SceneEdge {
                from: Position::new(0.0, 0.0),
                to: Position::new(100.0, 100.0),
                width: 2.0,
                color: Color::rgb(0, 0, 0),
            }],
            hulls: vec![HullPath {
                cluster: NodeId::new("c"),
                segments: smooth_closed_path(&outline),
                outline,
                colors: cluster_colors(1.0),
                bounds: BoundingBox {
                    x1: 0.0,
                    y1: 0.0,
                    x2: 100.0,
                    y2: 100.0,
                },
            }],
            bounds: BoundingBox {
                x1: 0.0,
                y1: 0.0,
                x2: 100.0,
                y2: 100.0,
            },
        }
    }

    fn settings() -> ExportSettings {
        ExportSettings {
            padding: 0.0,
            ..ExportSettings::default()
        }
    }

    #[test]
    fn test_frame_scales_with_device_pixel_ratio() {
        let mut settings = settings();
        settings.device_pixel_ratio = 2.0;
        let frame = RasterFrame::new(&scene(), &ImageSize::new("small", 0.5), &settings).unwrap();
        assert_eq!((frame.width, frame.height), (100, 100));

        let mut p = tiny_skia::Point::from_xy(100.0, 50.0);
        frame.transform.map_points(std::slice::from_mut(&mut p));
        assert_eq!((p.x, p.y), (100.0, 50.0));
    }

    #[test]
    fn test_frame_translates_bounds_origin() {
        let mut scene = scene();
        scene.bounds = BoundingBox {
            x1: -50.0,
            y1: 20.0,
            x2: 50.0,
            y2: 120.0,
        };
        let frame = RasterFrame::new(&scene, &ImageSize::new("large", 2.0), &settings()).unwrap();
        let mut p = tiny_skia::Point::from_xy(-50.0, 20.0);
        frame.transform.map_points(std::slice::from_mut(&mut p));
        assert_eq!((p.x, p.y), (0.0, 0.0));
        assert_eq!((frame.width, frame.height), (200, 200));
    }

    #[test]
    fn test_oversized_image_is_rejected() {
        let settings = ExportSettings {
            max_dimension: 50,
            ..settings()
        };
        let result = RasterFrame::new(&scene(), &ImageSize::new("large", 2.0), &settings);
        assert!(matches!(result, Err(ExportError::Render(_))));
    }

    #[test]
    fn test_overlay_is_composited_over_graph() {
        let scene = scene();
        let settings = settings();
        let frame = RasterFrame::new(&scene, &ImageSize::new("medium", 1.0), &settings).unwrap();

        let base = to_image(&render_graph(&scene, &frame, Color::WHITE).unwrap()).unwrap();
        let overlay = to_image(&render_overlay(&scene, &frame).unwrap()).unwrap();
        // Inside the hull, away from nodes and edges.
        let (x, y) = (80, 20);
        assert_eq!(base.get_pixel(x, y).0, [255, 255, 255, 255]);
        assert!(overlay.get_pixel(x, y).0[3] > 0);

        let png = create_network_image(&scene, &ImageSize::new("medium", 1.0), &settings).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (100, 100));
        let tinted = decoded.get_pixel(x, y).0;
        assert!(tinted[1] < 255, "hull fill should tint the background");
        assert_eq!(tinted[3], 255);
    }
}
