pub mod archive;
pub mod error;
pub mod legend;
pub mod render;
pub mod scene;
pub mod settings;

pub use archive::{ArchiveEntry, export_archive, readme, write_archive};
pub use error::ExportError;
pub use legend::legend_svg;
pub use render::create_network_image;
pub use scene::{ExportScene, SceneEdge, SceneNode};
pub use settings::{ExportSettings, ImageSize};
