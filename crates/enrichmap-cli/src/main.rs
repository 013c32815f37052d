use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use enrichmap_api::{HttpNetworkApi, NetworkApi, PositionsRequest};
use enrichmap_core::NetworkDocument;
use enrichmap_export::{ExportScene, ExportSettings, export_archive};
use enrichmap_graph::{EditorSettings, LayoutOptions, LoadOutcome, NetworkEditor};
use enrichmap_search::{PathwayEntry, SearchIndex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "EnrichmentMap network editor tools", long_about = None)]
struct Cli {
    /// JSON file with `editor` and `export` settings; missing keys use defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON file with editor settings only; replaces the `editor` section of `--config`
    #[arg(long, global = true)]
    editor_settings: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lay out a network document and print or write its positions
    Layout {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        iterations: Option<usize>,
        /// Re-run the layout even when the document carries positions
        #[arg(long)]
        force: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Build the export archive for a network held by the server
    Export {
        #[arg(long)]
        server: String,
        #[arg(long)]
        network: String,
        #[arg(long, default_value = "enrichment_map.zip")]
        output: PathBuf,
        /// Prefix of the permalink in the README
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Search genes and pathways of a network
    Search {
        #[arg(long)]
        server: String,
        #[arg(long)]
        network: String,
        query: String,
    },
    /// Discard the stored layout so the next load lays the network out again
    ResetLayout {
        #[arg(long)]
        server: String,
        #[arg(long)]
        network: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    editor: EditorSettings,
    export: ExportSettings,
}

impl AppConfig {
    fn load(path: Option<&Path>, editor_settings: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        if let Some(path) = editor_settings {
            config.editor = EditorSettings::load(path)
                .with_context(|| format!("Failed to load editor settings {}", path.display()))?;
        }
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads `doc` and lays it out when it has no stored layout (or `force`).
fn prepare_editor(
    settings: &EditorSettings,
    doc: &NetworkDocument,
    options: &LayoutOptions,
    force: bool,
) -> Result<NetworkEditor> {
    let mut editor = NetworkEditor::new(settings.clone());
    let now = Instant::now();
    let outcome = editor.load(doc, now)?;
    if force || outcome == LoadOutcome::NeedsLayout {
        let report = editor.apply_layout(options, now)?;
        info!(
            "Layout moved {} nodes ({} disconnected)",
            report.moved, report.disconnected
        );
    }
    editor.settle(now);
    Ok(editor)
}

fn run_layout(
    config: &AppConfig,
    input: &Path,
    options: &LayoutOptions,
    force: bool,
    output: Option<&Path>,
) -> Result<usize> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let doc = NetworkDocument::from_json(&text)
        .with_context(|| format!("Failed to parse {}", input.display()))?;
    let editor = prepare_editor(&config.editor, &doc, options, force)?;

    let body = PositionsRequest {
        positions: editor.persisted_positions(),
    };
    let json = serde_json::to_string_pretty(&body)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(body.positions.len())
}

async fn run_export(
    config: &AppConfig,
    server: &str,
    network: &str,
    output: &Path,
    base_url: Option<String>,
) -> Result<()> {
    let api = HttpNetworkApi::new(server);
    let doc = api.get_network(network).await?;
    let editor = prepare_editor(&config.editor, &doc, &LayoutOptions::default(), false)?;
    let scene = ExportScene::capture(&editor).ok_or_else(|| anyhow!("Network {network} is empty"))?;
    let info = editor
        .network()
        .cloned()
        .ok_or_else(|| anyhow!("Network {network} did not load"))?;

    let mut settings = config.export.clone();
    if let Some(base_url) = base_url {
        settings.base_url = base_url;
    }
    let bytes = export_archive(&api, &info, scene, &settings).await?;
    std::fs::write(output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}

async fn run_search(server: &str, network: &str, query: &str) -> Result<()> {
    let api = HttpNetworkApi::new(server);
    let doc = api.get_network(network).await?;
    let pathways: Vec<PathwayEntry> = doc
        .elements
        .nodes
        .iter()
        .map(|node| PathwayEntry::from(&node.to_pathway()))
        .collect();

    let mut index = SearchIndex::new()?;
    index.load(&api, network, pathways).await?;

    let genes = index.search_genes(query)?;
    println!("Genes ({}):", genes.len());
    for hit in genes {
        println!("  {}\t{:.3}\t{}", hit.symbol, hit.rank, hit.pathways.join(", "));
    }
    let pathways = index.search_pathways(query)?;
    println!("Pathways ({}):", pathways.len());
    for hit in pathways {
        println!("  {}\t{}", hit.id, hit.label);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = AppConfig::load(cli.config.as_deref(), cli.editor_settings.as_deref())?;

    match cli.command {
        Command::Layout {
            input,
            seed,
            iterations,
            force,
            output,
        } => {
            let options = LayoutOptions { seed, iterations };
            let count = run_layout(&config, &input, &options, force, output.as_deref())?;
            info!("Wrote {} position records", count);
        }
        Command::Export {
            server,
            network,
            output,
            base_url,
        } => run_export(&config, &server, &network, &output, base_url).await?,
        Command::Search {
            server,
            network,
            query,
        } => run_search(&server, &network, &query).await?,
        Command::ResetLayout { server, network } => {
            HttpNetworkApi::new(server.as_str())
                .delete_positions(&network)
                .await?;
            println!("Stored layout of {network} discarded");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::tempdir;

    const NETWORK: &str = r#"{
        "networkIDStr": "cli-net",
        "elements": {
            "nodes": [
                { "data": { "id": "a", "name": ["GS_A"], "NES": 1.0, "padj": 0.01, "gs_size": 10 } },
                { "data": { "id": "b", "name": ["GS_B"], "NES": 2.0, "padj": 0.01, "gs_size": 10 } },
                { "data": { "id": "c", "name": ["GS_C"], "NES": -1.0, "padj": 0.01, "gs_size": 10 } }
            ],
            "edges": [
                { "data": { "id": "ab", "source": "a", "target": "b", "similarity_coefficient": 0.5 } }
            ]
        },
        "clusters": [ { "id": "k", "label": "K", "members": ["a", "b"] } ]
    }"#;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_falls_back_to_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "editor": { "layout": { "seed": 7 } } }"#)?;

        let config = AppConfig::load(Some(&path), None)?;
        assert_eq!(config.editor.layout.seed, 7);
        assert_eq!(config.editor.clusters, EditorSettings::default().clusters);
        assert_eq!(config.export, ExportSettings::default());
        assert_eq!(AppConfig::load(None, None)?, AppConfig::default());
        Ok(())
    }

    #[test]
    fn test_editor_settings_file_replaces_editor_section() -> Result<()> {
        let dir = tempdir()?;
        let config_path = dir.path().join("config.json");
        let editor_path = dir.path().join("editor.json");
        std::fs::write(
            &config_path,
            r#"{ "editor": { "layout": { "seed": 7 } }, "export": { "padding": 4.0 } }"#,
        )?;
        std::fs::write(&editor_path, r#"{ "history": { "capacity": 12 } }"#)?;

        let config = AppConfig::load(Some(&config_path), Some(&editor_path))?;
        assert_eq!(config.editor.history.capacity, 12);
        assert_eq!(config.editor.layout.seed, EditorSettings::default().layout.seed);
        assert_eq!(config.export.padding, 4.0);

        std::fs::write(&editor_path, "{ nope")?;
        assert!(AppConfig::load(None, Some(&editor_path)).is_err());
        Ok(())
    }

    #[test]
    fn test_layout_writes_positions_file() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("network.json");
        let output = dir.path().join("positions.json");
        std::fs::write(&input, NETWORK)?;

        let options = LayoutOptions {
            seed: Some(5),
            iterations: Some(40),
        };
        let count = run_layout(&AppConfig::default(), &input, &options, false, Some(&output))?;
        // Three leaves plus the cluster.
        assert_eq!(count, 4);

        let written: PositionsRequest = serde_json::from_str(&std::fs::read_to_string(&output)?)?;
        assert_eq!(written.positions.len(), 4);
        let cluster = written
            .positions
            .iter()
            .find(|p| p.id.as_str() == "k")
            .ok_or_else(|| anyhow!("cluster record missing"))?;
        assert!(cluster.collapsed);
        Ok(())
    }
}
