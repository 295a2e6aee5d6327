use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use wirecore::events::names;
use wirecore::{EventBus, Node, Port, PortValues, SubscribeOptions, Validator, Value, Workflow};
use wireruntime::{ExecuteOptions, WorkflowEngine};

#[derive(Parser)]
#[command(name = "wire")]
#[command(about = "Wireflow workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Seed inputs for entry nodes, as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Execute level cohorts concurrently
        #[arg(short, long)]
        parallel: bool,

        /// Abort the run after this many milliseconds (0 = no timeout)
        #[arg(long, default_value_t = 0)]
        timeout_ms: u64,

        /// Echo lifecycle events while running
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Write an example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, input, parallel, timeout_ms, verbose } => {
            init_tracing(verbose);
            run_workflow(&file, input, parallel, timeout_ms, verbose).await?;
        }
        Commands::Validate { file } => {
            init_tracing(false);
            validate_workflow(&file)?;
        }
        Commands::Nodes => {
            init_tracing(false);
            list_nodes().await;
        }
        Commands::Init { output } => {
            write_example(&output)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn load_workflow(path: &Path) -> Result<Workflow> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening workflow file {}", path.display()))?;
    let workflow: Workflow =
        serde_json::from_reader(file).context("parsing workflow JSON")?;
    Ok(workflow)
}

fn parse_inputs(input: Option<String>) -> Result<PortValues> {
    let Some(text) = input else { return Ok(PortValues::new()) };
    let json: serde_json::Value = serde_json::from_str(&text).context("parsing --input JSON")?;
    let serde_json::Value::Object(entries) = json else {
        bail!("--input must be a JSON object of port values");
    };
    Ok(entries.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
}

async fn run_workflow(
    path: &Path,
    input: Option<String>,
    parallel: bool,
    timeout_ms: u64,
    verbose: bool,
) -> Result<()> {
    let workflow = load_workflow(path)?;
    let inputs = parse_inputs(input)?;

    let bus = EventBus::new();
    if verbose {
        echo_events(&bus).await;
    }

    let engine = WorkflowEngine::new(bus);
    wirenodes::register_all(engine.executor()).await;

    let options = ExecuteOptions {
        inputs,
        parallel,
        timeout: Duration::from_millis(timeout_ms),
        variables: HashMap::new(),
    };

    let result = engine.execute_workflow(&workflow, options).await?;

    println!(
        "workflow '{}' completed: {} nodes in {}ms",
        result.workflow_id, result.stats.nodes_executed, result.stats.duration_ms
    );
    for (node_id, outputs) in &result.outputs {
        let json = serde_json::Value::from(Value::Object(outputs.clone()));
        println!("  {node_id}: {}", serde_json::to_string_pretty(&json)?);
    }

    Ok(())
}

async fn echo_events(bus: &EventBus) {
    let lifecycle = [
        names::WORKFLOW_STARTED,
        names::WORKFLOW_COMPLETED,
        names::WORKFLOW_FAILED,
        names::WORKFLOW_PAUSED,
        names::WORKFLOW_RESUMED,
        names::NODE_EXECUTION_STARTED,
        names::NODE_EXECUTION_COMPLETED,
        names::NODE_EXECUTION_FAILED,
        names::SYSTEM_ERROR,
    ];
    for event_type in lifecycle {
        bus.subscribe(
            event_type,
            |event| async move {
                let payload = serde_json::Value::from(event.payload);
                eprintln!("[{}] {}", event.event_type, payload);
                Ok(())
            },
            SubscribeOptions::default(),
        )
        .await;
    }
}

fn validate_workflow(path: &Path) -> Result<()> {
    let workflow = load_workflow(path)?;

    let report = Validator::new().validate_workflow(&workflow);
    for (node_id, errors) in &report.node_errors {
        for error in errors {
            println!("node {node_id}: {} ({})", error.message, error.rule_id);
        }
    }
    for error in &report.connection_errors {
        println!("connection: {error}");
    }

    match wireruntime::execution_order(&workflow) {
        Ok(order) => println!("execution order: {}", order.join(" -> ")),
        Err(error) => {
            println!("structure: {error}");
            bail!("workflow '{}' is invalid", workflow.id);
        }
    }

    if !report.ok {
        bail!("workflow '{}' is invalid", workflow.id);
    }
    println!(
        "workflow '{}' is valid: {} nodes, {} connections",
        workflow.id,
        workflow.nodes.len(),
        workflow.connections.len()
    );
    Ok(())
}

async fn list_nodes() {
    let engine = WorkflowEngine::new(EventBus::new());
    wirenodes::register_all(engine.executor()).await;

    println!("registered node types:");
    for node_type in engine.executor().registered_types().await {
        println!("  {node_type}");
    }
}

fn write_example(path: &Path) -> Result<()> {
    let mut workflow = Workflow::new("example", "Example workflow");
    workflow.add_node(
        Node::new("greeting", "util.constant", "Greeting")
            .with_config("text", "{\"hello\": \"world\"}")
            .with_output(Port::output("text", "string")),
    )?;
    workflow.add_node(
        Node::new("parse", "transform.json_parse", "Parse")
            .with_input(Port::input("json", "string"))
            .with_output(Port::output("parsed", "object")),
    )?;
    workflow.add_node(
        Node::new("log", "debug.log", "Log").with_input(Port::input("message", "object")),
    )?;

    workflow.connect("greeting", "text", "parse", "json")?;
    workflow.connect("parse", "parsed", "log", "message")?;
    workflow.mark_entry("greeting");
    workflow.mark_exit("parse");

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(path, json)
        .with_context(|| format!("writing example workflow to {}", path.display()))?;
    println!("wrote example workflow to {}", path.display());
    Ok(())
}
