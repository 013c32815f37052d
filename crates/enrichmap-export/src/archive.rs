//! Zip archive with images, the legend, the data tables and a README.

use crate::error::ExportError;
use crate::legend::legend_svg;
use crate::render::create_network_image;
use crate::scene::ExportScene;
use crate::settings::ExportSettings;
use chrono::{DateTime, Utc};
use enrichmap_api::{ExportKind, NetworkApi};
use enrichmap_events::telemetry::{OP_EXPORT_ARCHIVE, OperationSpan};
use enrichmap_graph::NetworkInfo;
use std::io::{Cursor, Write};
use tracing::info;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

pub const LEGEND_PATH: &str = "images/legend.svg";
pub const README_PATH: &str = "README.md";

/// One file of the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub path: String,
    pub contents: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

pub fn readme(network: &NetworkInfo, settings: &ExportSettings, created: DateTime<Utc>) -> String {
    let mut text = format!(
        "# {}\n\nExported from EnrichmentMap on {}.\n\nPermalink: {}\n\n",
        if network.name.is_empty() {
            "EnrichmentMap network"
        } else {
            network.name.as_str()
        },
        created.format("%Y-%m-%d %H:%M:%S UTC"),
        settings.permalink(&network.id),
    );
    text.push_str("## Parameters\n\n");
    if network.parameters.is_empty() {
        text.push_str("(none recorded)\n");
    }
    for (key, value) in &network.parameters {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        text.push_str(&format!("- {key}: {value}\n"));
    }
    text.push_str("\n## Contents\n\n");
    for size in &settings.sizes {
        text.push_str(&format!("- {}: network image ({}x)\n", size.file_name(), size.scale));
    }
    text.push_str(&format!("- {LEGEND_PATH}: colour legend\n"));
    for kind in ExportKind::ALL {
        text.push_str(&format!("- {}\n", kind.archive_path()));
    }
    text
}

async fn fetch_tables(api: &dyn NetworkApi, net_id: &str) -> Result<Vec<ArchiveEntry>, ExportError> {
    let (enrichment, ranks, gmt) = tokio::try_join!(
        api.export_text(ExportKind::Enrichment, net_id),
        api.export_text(ExportKind::Ranks, net_id),
        api.export_text(ExportKind::Gmt, net_id),
    )?;
    Ok(vec![
        ArchiveEntry::new(ExportKind::Enrichment.archive_path(), enrichment),
        ArchiveEntry::new(ExportKind::Ranks.archive_path(), ranks),
        ArchiveEntry::new(ExportKind::Gmt.archive_path(), gmt),
    ])
}

async fn render_images(scene: ExportScene, settings: ExportSettings) -> Result<Vec<ArchiveEntry>, ExportError> {
    tokio::task::spawn_blocking(move || {
        let mut entries = Vec::with_capacity(settings.sizes.len() + 1);
        for size in &settings.sizes {
            let png = create_network_image(&scene, size, &settings)?;
            entries.push(ArchiveEntry::new(size.file_name(), png));
        }
        entries.push(ArchiveEntry::new(LEGEND_PATH, legend_svg()));
        Ok(entries)
    })
    .await
    .map_err(|e| ExportError::Join(e.to_string()))?
}

pub fn write_archive(entries: &[ArchiveEntry]) -> Result<Vec<u8>, ExportError> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for entry in entries {
        zip.start_file(entry.path.as_str(), options)?;
        zip.write_all(&entry.contents)?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Builds the whole archive. Table downloads and image rendering run
/// concurrently; any failure rejects the export and no archive is produced.
pub async fn export_archive(
    api: &dyn NetworkApi,
    network: &NetworkInfo,
    scene: ExportScene,
    settings: &ExportSettings,
) -> Result<Vec<u8>, ExportError> {
    let span = OperationSpan::start(OP_EXPORT_ARCHIVE);
    span.context(&format!("network {}", network.id));
    let result = async {
        let (tables, images) = tokio::try_join!(
            fetch_tables(api, &network.id),
            render_images(scene, settings.clone()),
        )?;
        let mut entries = images;
        entries.extend(tables);
        entries.push(ArchiveEntry::new(
            README_PATH,
            readme(network, settings, Utc::now()),
        ));
        let bytes = write_archive(&entries)?;
        info!(
            "Export archive for {}: {} files, {} bytes",
            network.id,
            entries.len(),
            bytes.len()
        );
        Ok(bytes)
    }
    .await;
    span.finish(result)
}
