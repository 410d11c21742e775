//! SceneSynth CLI: command-line front end over a scene hierarchy
//!
//! Every command loads the world snapshot, runs against an in-process
//! hierarchy manager and writes the snapshot back when it changed.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use scenesynth::graph::{ExpansionState, GraphId, NodeId, SceneGraph};
use scenesynth::hierarchy::{BatchReport, HierarchyManager, ManagerOptions};
use scenesynth::llm::{LlmSceneGenerator, MockSceneGenerator, SceneGenerator};
use scenesynth::mutation::Outcome;
use scenesynth::persistence::Snapshot;
use scenesynth::render::{GeminiImageRenderer, PlaceholderRenderer, RenderStyle, SceneRenderer};
use scenesynth::SceneSynthConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scenesynth", version, about = "SceneSynth scene hierarchy CLI")]
struct Cli {
    /// World snapshot file (a .gz extension enables compression)
    #[arg(long, default_value = "world.json", global = true, env = "SCENESYNTH_WORLD")]
    world: PathBuf,

    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the offline generator and placeholder renderer
    #[arg(long, global = true)]
    offline: bool,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new world from a prompt, replacing the snapshot
    Generate {
        prompt: String,

        /// Number of nodes in the root scene
        #[arg(long)]
        nodes: Option<usize>,
    },
    /// Show a graph (the active one by default)
    Show {
        #[arg(long)]
        graph: Option<String>,
    },
    /// Expand a node into its child scene
    Expand {
        node: String,

        #[arg(long)]
        graph: Option<String>,

        /// Make the child scene the active one
        #[arg(long)]
        enter: bool,
    },
    /// Apply a free-text edit instruction
    Edit {
        instruction: String,

        #[arg(long)]
        graph: Option<String>,
    },
    /// Render a graph to an image
    Render {
        #[arg(long)]
        graph: Option<String>,

        /// Preset name or free-text style
        #[arg(long)]
        style: Option<String>,

        /// PNG snapshot of the canvas to guide the render
        #[arg(long)]
        canvas: Option<PathBuf>,

        /// Write the image to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Remove a node and any scenes below it
    Remove {
        node: String,

        #[arg(long)]
        graph: Option<String>,
    },
    /// Check a snapshot without modifying it
    Validate,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_env("SCENESYNTH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        world,
        config,
        offline,
        format,
        command,
    } = cli;

    if let Commands::Validate = command {
        return run_validate(&world);
    }

    let config = load_config(config.as_deref())?;
    let manager = build_manager(&config, offline)?;

    if let Commands::Generate { prompt, nodes } = command {
        let root = manager.create_from_prompt(&prompt, nodes).await?;
        manager.save(&world).await?;
        info!("Created world {} in {}", root, world.display());
        return print_graph(&manager, &root, &format).await;
    }

    manager
        .load(&world)
        .await
        .with_context(|| format!("loading {}", world.display()))?;

    match command {
        Commands::Show { graph } => {
            let id = target(&manager, graph).await;
            print_graph(&manager, &id, &format).await
        }
        Commands::Expand { node, graph, enter } => {
            let id = target(&manager, graph).await;
            let node = NodeId::new(node);
            let child = manager.expand(&id, &node).await?;
            if enter {
                manager.navigate_to(&child).await?;
            }
            manager.save(&world).await?;
            print_graph(&manager, &child, &format).await
        }
        Commands::Edit { instruction, graph } => {
            let id = target(&manager, graph).await;
            let report = manager.edit(&id, &instruction).await?;
            manager.save(&world).await?;
            print_report(&report, &format);
            Ok(())
        }
        Commands::Render {
            graph,
            style,
            canvas,
            out,
        } => {
            let id = target(&manager, graph).await;
            let canvas = canvas
                .map(|path| std::fs::read(&path).with_context(|| format!("reading {}", path.display())))
                .transpose()?;
            let style = style.as_deref().map(RenderStyle::parse);
            let artifact = manager.render(&id, canvas.map(Into::into), style).await?;
            manager.save(&world).await?;

            let bytes = artifact.bytes()?;
            if let Some(out) = out {
                std::fs::write(&out, &bytes).with_context(|| format!("writing {}", out.display()))?;
                println!("Wrote {} bytes of {} to {}", bytes.len(), artifact.media_type, out.display());
            } else {
                println!("Rendered {} bytes of {}", bytes.len(), artifact.media_type);
            }
            Ok(())
        }
        Commands::Remove { node, graph } => {
            let id = target(&manager, graph).await;
            let removed = manager.remove_node(&id, &NodeId::new(node)).await?;
            manager.save(&world).await?;
            println!(
                "Removed node {} and {} edge(s)",
                removed.node.id,
                removed.edges.len()
            );
            if let Some(child) = removed.orphaned_child() {
                println!("Pruned scene {} and everything below it", child);
            }
            Ok(())
        }
        Commands::Generate { .. } | Commands::Validate => Ok(()),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SceneSynthConfig> {
    match path {
        Some(path) => SceneSynthConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(SceneSynthConfig::from_env()?),
    }
}

fn build_manager(config: &SceneSynthConfig, offline: bool) -> anyhow::Result<HierarchyManager> {
    let (generator, renderer): (Arc<dyn SceneGenerator>, Arc<dyn SceneRenderer>) = if offline {
        (
            Arc::new(MockSceneGenerator::new()),
            Arc::new(PlaceholderRenderer::default()),
        )
    } else {
        (
            Arc::new(LlmSceneGenerator::new(&config.llm, config.generation)?),
            Arc::new(GeminiImageRenderer::new(&config.render)?),
        )
    };

    Ok(HierarchyManager::new_empty("Untitled", generator, renderer)
        .with_options(ManagerOptions::from_config(config)))
}

async fn target(manager: &HierarchyManager, graph: Option<String>) -> GraphId {
    match graph {
        Some(id) => GraphId::new(id),
        None => manager.active_graph_id().await,
    }
}

fn run_validate(path: &Path) -> anyhow::Result<()> {
    let snapshot = Snapshot::load(path).with_context(|| format!("loading {}", path.display()))?;
    let graphs = snapshot.graphs.len();
    let artifacts = snapshot.artifacts.len();
    match snapshot.into_forest() {
        Ok(forest) => {
            let nodes: usize = forest.graphs().map(SceneGraph::node_count).sum();
            println!(
                "OK: {} graph(s), {} node(s), {} render(s)",
                graphs, nodes, artifacts
            );
            Ok(())
        }
        Err(e) => bail!("{} is invalid: {}", path.display(), e),
    }
}

async fn print_graph(
    manager: &HierarchyManager,
    id: &GraphId,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let Some(graph) = manager.graph(id).await else {
        bail!("graph {} not found", id);
    };

    if let OutputFormat::Json = format {
        println!("{}", graph.to_prompt_json());
        return Ok(());
    }

    let crumbs: Vec<String> = manager
        .breadcrumbs()
        .await
        .into_iter()
        .map(|c| c.name)
        .collect();
    println!("{}", crumbs.join(" > "));
    println!("{} [{}] depth {}", graph.name, graph.id(), graph.depth());

    let mut nodes = Table::new();
    nodes.set_content_arrangement(ContentArrangement::Dynamic);
    nodes.set_header(vec!["ID", "Name", "Type", "Position", "Size", "Scene"]);
    for node in graph.nodes() {
        let scene = match node.expansion_state() {
            ExpansionState::Expanded(child) => child.to_string(),
            ExpansionState::Collapsed => "collapsed".to_string(),
            ExpansionState::NotExpandable => "-".to_string(),
        };
        nodes.add_row(vec![
            node.id.to_string(),
            node.name.clone(),
            node.semantic_type.to_string(),
            node.position.to_string(),
            format!("{:.1}", node.size),
            scene,
        ]);
    }
    println!("{}", nodes);

    if graph.edge_count() > 0 {
        let mut edges = Table::new();
        edges.set_content_arrangement(ContentArrangement::Dynamic);
        edges.set_header(vec!["Source", "Relation", "Target"]);
        for edge in graph.edges() {
            edges.add_row(vec![
                edge.source.to_string(),
                edge.relation.clone(),
                edge.target.to_string(),
            ]);
        }
        println!("{}", edges);
    }
    println!("{} node(s), {} edge(s)", graph.node_count(), graph.edge_count());
    Ok(())
}

fn describe(outcome: &Outcome) -> String {
    match outcome {
        Outcome::NodeAdded(id) => format!("added {}", id),
        Outcome::NodeUpdated(id) => format!("updated {}", id),
        Outcome::NodeRemoved {
            id,
            edges_removed,
            orphaned,
        } => match orphaned {
            Some(child) => format!("removed {} ({} edges, pruned {})", id, edges_removed, child),
            None => format!("removed {} ({} edges)", id, edges_removed),
        },
        Outcome::EdgeAdded(id) => format!("added {}", id),
        Outcome::EdgesUpdated(n) => format!("relabelled {} edge(s)", n),
        Outcome::EdgesRemoved(n) => format!("removed {} edge(s)", n),
        Outcome::ExpansionQueued(id) => format!("expanding {}", id),
    }
}

fn print_report(report: &BatchReport, format: &OutputFormat) {
    if let OutputFormat::Json = format {
        let value = serde_json::json!({
            "graph": report.graph_id.as_str(),
            "applied": report.result.applied_indices(),
            "skipped": report.result.skipped.iter()
                .map(|s| serde_json::json!({"index": s.index, "error": s.error.to_string()}))
                .collect::<Vec<_>>(),
            "created": report.result.created.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
        return;
    }

    let mut rows: Vec<(usize, String, String)> = report
        .result
        .applied
        .iter()
        .map(|a| (a.index, a.op.kind().to_string(), describe(&a.outcome)))
        .chain(
            report
                .result
                .skipped
                .iter()
                .map(|s| (s.index, s.op.kind().to_string(), format!("skipped: {}", s.error))),
        )
        .collect();
    rows.sort_by_key(|r| r.0);

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "Operation", "Result"]);
    for (index, kind, result) in rows {
        table.add_row(vec![index.to_string(), kind, result]);
    }
    println!("{}", table);

    for expansion in &report.expansions {
        match &expansion.result {
            Ok(child) => println!("Expanded {} into {}", expansion.node_id, child),
            Err(e) => println!("Expansion of {} failed: {}", expansion.node_id, e),
        }
    }
    println!(
        "{} applied, {} skipped",
        report.result.applied.len(),
        report.result.skipped.len()
    );
}
