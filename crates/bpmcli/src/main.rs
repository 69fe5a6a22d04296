// crates/bpmcli/src/main.rs

use anyhow::{Context, Result};
use bpmcore::{
    node_types, Bindings, ExecutionEvent, NodeEvent, NodeTemplate, ProcessDefinition,
    PropertyDeclaration, Value, ValueKind,
};
use bpmnodes::SimpleEvaluator;
use bpmruntime::{Engine, GraphBuilder, InstanceStatus, RuntimeConfig};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "bpm")]
#[command(about = "Process engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a process definition file
    Run {
        /// Path to definition JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input parameters as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Stop the instance if it has not settled after this long
        #[arg(short, long, default_value_t = 30_000)]
        timeout_ms: u64,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a definition file
    Validate {
        /// Path to definition JSON file
        file: PathBuf,
    },

    /// List the built-in node types
    Nodes,

    /// Create an example definition
    Init {
        /// Output file path
        #[arg(short, long, default_value = "process.json")]
        output: PathBuf,
    },
}

/// Convert plain JSON into a parameter value
fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) => Value::Number(f),
            None => Value::Json(serde_json::Value::Number(n)),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => {
            Value::Array(arr.into_iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(obj) => {
            let map: HashMap<String, Value> = obj
                .into_iter()
                .map(|(k, v)| (k, json_to_value(v)))
                .collect();
            Value::Object(map)
        }
    }
}

/// Parse `--input`, keeping values of `json`-kind properties as raw JSON.
fn parse_inputs(definition: &ProcessDefinition, input: Option<String>) -> Result<Bindings> {
    let Some(input) = input else {
        return Ok(Bindings::new());
    };

    let json: serde_json::Value = serde_json::from_str(&input).context("parsing --input")?;
    let serde_json::Value::Object(obj) = json else {
        anyhow::bail!("Input must be a JSON object");
    };

    Ok(obj
        .into_iter()
        .map(|(name, raw)| {
            let keep_raw = definition
                .find_property(&name)
                .map(|p| p.kind == ValueKind::Json && !p.is_collection)
                .unwrap_or(false);
            let value = if keep_raw {
                Value::Json(raw)
            } else {
                json_to_value(raw)
            };
            (name, value)
        })
        .collect())
}

fn load_definition(file: &Path) -> Result<ProcessDefinition> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let definition: ProcessDefinition = serde_json::from_str(&json)
        .with_context(|| format!("parsing {}", file.display()))?;
    Ok(definition)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            timeout_ms,
            verbose,
        } => {
            let level = if verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::INFO
            };
            tracing_subscriber::fmt().with_max_level(level).init();

            run_process(file, input, timeout_ms).await?;
        }

        Commands::Validate { file } => {
            validate_process(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_process(output)?;
        }
    }

    Ok(())
}

async fn run_process(file: PathBuf, input: Option<String>, timeout_ms: u64) -> Result<()> {
    println!("🚀 Loading process from: {}", file.display());

    let definition = load_definition(&file)?;
    println!("📋 Process: {}", definition.name);
    println!("   Nodes: {}", definition.nodes.len());
    println!("   Transitions: {}", definition.transitions.len());
    println!();

    let inputs = parse_inputs(&definition, input)?;

    let engine = Engine::with_config(RuntimeConfig::default());
    let id = engine.register_definition(definition)?;
    let instance = engine.instantiate(id)?;
    instance.set_handlers(bpmnodes::default_handlers(Arc::new(SimpleEvaluator::new())))?;

    let mut events = engine.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::InstanceStarted { instance_id, .. } => {
                    println!("▶️  Instance {} started", instance_id);
                }
                ExecutionEvent::NodeDispatched {
                    node_id, node_type, ..
                } => {
                    println!("  ⚡ Dispatching node: {} ({})", node_id, node_type);
                }
                ExecutionEvent::NodeCompleted { node_id, .. } => {
                    println!("  ✅ Node {} completed", node_id);
                }
                ExecutionEvent::BranchHalted {
                    node_id, reason, ..
                } => {
                    println!("  ⛔ Branch halted at {}: {}", node_id, reason);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", node_id, message);
                    }
                },
                ExecutionEvent::InstanceIdle { .. } => {
                    println!("✨ Instance is idle");
                }
                ExecutionEvent::InstanceStopped { .. } => {
                    println!("🛑 Instance stopped");
                }
            }
        }
    });

    instance.start_with(inputs)?;

    let settled =
        tokio::time::timeout(Duration::from_millis(timeout_ms), instance.wait_until_idle()).await;
    let status = match settled {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!(instance = %instance.id(), "Timed out after {}ms; stopping", timeout_ms);
            instance.stop();
            instance.wait_until_idle().await
        }
    };

    // Let the event printer catch up
    tokio::time::sleep(Duration::from_millis(100)).await;
    event_task.abort();

    let completed = instance
        .graph()
        .nodes()
        .filter(|n| n.completion_count() > 0)
        .count();

    println!();
    println!("📊 Execution Summary:");
    println!("   Instance ID: {}", instance.id());
    println!("   Status: {:?}", status);
    println!("   Completed: {}/{} nodes", completed, instance.graph().len());

    let outputs = instance.read_outputs();
    if !outputs.is_empty() {
        let mut keys: Vec<&String> = outputs.keys().collect();
        keys.sort();
        println!();
        println!("📤 Outputs:");
        for key in keys {
            println!("   {}: {:?}", key, outputs[key]);
        }
    }

    if status == InstanceStatus::Stopped {
        anyhow::bail!("process did not finish within {}ms", timeout_ms);
    }

    Ok(())
}

fn validate_process(file: PathBuf) -> Result<()> {
    println!("🔍 Validating process: {}", file.display());

    let definition = load_definition(&file)?;
    definition.validate()?;
    let graph = GraphBuilder::new(&definition).build()?;

    let registry = bpmnodes::default_handlers(Arc::new(SimpleEvaluator::new()));
    let missing = registry.missing(&graph.node_types());

    println!("✅ Process is valid:");
    println!("   Name: {}", definition.name);
    println!("   Reachable vertices: {}", graph.len());
    println!("   Edges: {}", graph.edge_count());

    let unreachable: Vec<&str> = definition
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| !graph.contains(id))
        .collect();
    if !unreachable.is_empty() {
        println!("   ⚠️  Unreachable nodes: {}", unreachable.join(", "));
    }
    if !missing.is_empty() {
        println!(
            "   ⚠️  Needs custom handlers for: {}",
            missing.join(", ")
        );
    }

    Ok(())
}

fn list_nodes() {
    println!("📦 Built-in Node Types:");
    println!();

    let registry = bpmnodes::default_handlers(Arc::new(SimpleEvaluator::new()));

    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn create_example_process(output: PathBuf) -> Result<()> {
    let mut definition = ProcessDefinition::new("Order Review");
    definition.description =
        Some("Scores an order on two parallel checks and routes it".to_string());
    definition.declare(PropertyDeclaration::new("p-amount", "amount", ValueKind::Number));
    definition.declare(PropertyDeclaration::new("p-items", "items", ValueKind::Integer));

    definition.add_node(NodeTemplate::new("start", node_types::START_EVENT).with_name("Order received"));
    definition.add_node(NodeTemplate::new("split", node_types::PARALLEL_GATEWAY));
    definition.add_node(
        NodeTemplate::new("price-check", node_types::SCRIPT_TASK)
            .with_name("Price check")
            .with_expression("amount = amount; risk = amount / 100"),
    );
    definition.add_node(
        NodeTemplate::new("volume-check", node_types::SCRIPT_TASK)
            .with_name("Volume check")
            .with_expression("bulk = items > 10"),
    );
    definition.add_node(NodeTemplate::new("join", node_types::PARALLEL_GATEWAY));
    definition.add_node(NodeTemplate::new("route", node_types::EXCLUSIVE_GATEWAY));
    definition.add_node(NodeTemplate::new("approve", node_types::END_EVENT).with_name("Approved"));
    definition.add_node(NodeTemplate::new("review", node_types::END_EVENT).with_name("Manual review"));

    definition.connect("f-start", "start", "split");
    definition.connect("f-price", "split", "price-check");
    definition.connect("f-volume", "split", "volume-check");
    definition.connect("f-price-done", "price-check", "join");
    definition.connect("f-volume-done", "volume-check", "join");
    definition.connect("f-route", "join", "route");
    definition.connect_when("f-approve", "route", "approve", "risk < 5 && !bulk");
    definition.connect_when("f-review", "route", "review", "risk >= 5 || bulk");

    let json = serde_json::to_string_pretty(&definition)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example process: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  bpm run --file {} --input '{{\"amount\": 250, \"items\": 3}}'",
        output.display()
    );

    Ok(())
}
