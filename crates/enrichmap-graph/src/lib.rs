pub mod cluster;
pub mod editor;
pub mod graph;
pub mod history;
pub mod hull;
pub mod layout;
pub mod overlay;
pub mod settings;
pub mod style;
pub mod viewport;

pub use cluster::{ClusterState, ClusterStateMachine, ToggleOutcome, scale_about_centroid};
pub use editor::{LoadOutcome, NetworkEditor, NetworkInfo};
pub use graph::{Graph, GraphError, centroid};
pub use history::{UndoAction, UndoHistory};
pub use hull::{PathSegment, convex_hull, smooth_closed_path};
pub use layout::{
    CancellationToken, ForceLayout, LayoutError, LayoutInput, LayoutJob, LayoutOptions,
    LayoutOrchestrator, LayoutOutcome, LayoutReport, place_disconnected,
};
pub use overlay::{HullPath, OverlayCache, OverlayLayer, OverlayPath};
pub use settings::{
    ClusterSettings, EditorSettings, HistorySettings, LayoutSettings, OverlaySettings,
    SettingsError,
};
pub use style::{Color, OverlayColors};
pub use viewport::{Viewport, ZoomBounds};
