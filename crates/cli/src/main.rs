//! `fragment-engine` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — validate a task definition JSON file.
//! - `run`      — run a task definition against a sample fragment, with every
//!   action reference bound to a stub, and print the execution log.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use actions::mock::MockAction;
use actions::{ActionRegistry, ActionResult};
use engine::{Graph, NodeKindDefinition, TaskDefinition, TaskEngine};
use fragment::Fragment;

#[derive(Parser)]
#[command(
    name = "fragment-engine",
    about = "Task engine that processes content fragments through action graphs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a task definition JSON file.
    Validate {
        /// Path to the task definition JSON file.
        path: PathBuf,
    },
    /// Run a task definition against a sample fragment and print the
    /// execution log as JSON.  Action references resolve to stubs that
    /// always succeed.
    Run {
        /// Path to the task definition JSON file.
        path: PathBuf,
        /// Type of the sample fragment.
        #[arg(long, default_value = "snippet")]
        fragment_type: String,
        /// Body of the sample fragment.
        #[arg(long, default_value = "")]
        body: String,
    },
}

/// Binds every action reference in the definition (including fallbacks) to a
/// stub that returns `_success`, so structural validation and dry runs do
/// not require real action implementations.
fn stub_registry(definition: &TaskDefinition) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    for node in &definition.nodes {
        if let NodeKindDefinition::Action {
            action, fallback, ..
        } = &node.kind
        {
            registry.register(
                action.clone(),
                MockAction::returning(action.clone(), ActionResult::success()),
            );
            if let Some(fallback) = fallback {
                registry.register(
                    fallback.clone(),
                    MockAction::returning(fallback.clone(), ActionResult::success()),
                );
            }
        }
    }
    registry
}

fn load_definition(path: &PathBuf) -> Result<TaskDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).context("invalid task definition JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let definition = load_definition(&path)?;
            let nodes = definition.nodes.len();
            let registry = stub_registry(&definition);

            match Graph::compile(definition, &registry) {
                Ok(graph) => {
                    println!("✅ Task '{}' is valid ({nodes} nodes).", graph.task_name());
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run {
            path,
            fragment_type,
            body,
        } => {
            let definition = load_definition(&path)?;
            let registry = stub_registry(&definition);
            let graph =
                Arc::new(Graph::compile(definition, &registry).context("task definition invalid")?);

            info!(task = %graph.task_name(), "running dry run with stub actions");

            let fragment = Fragment::new(fragment_type, json!({}), body);
            let result = TaskEngine::new().execute(fragment, graph).await;

            let output = json!({
                "status": result.status,
                "fragment": result.fragment,
                "log": result.log,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
