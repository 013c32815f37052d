use enrichmap_api::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export: the network is empty")]
    EmptyScene,
    #[error("render failed: {0}")]
    Render(String),
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export data unavailable: {0}")]
    Api(#[from] ApiError),
    #[error("export task failed: {0}")]
    Join(String),
}
