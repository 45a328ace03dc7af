// crates/flowcli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flowcore::{ExecutionData, ExecutionEvent, Flow, NodeEvent, Operator, RunStatus, Trigger, Value};
use flowruntime::{
    Capabilities, DirectoryFlowLoader, EchoModelAdapter, FlowRuntime, RuntimeConfig,
};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Flow Engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow file
    Run {
        /// Path to flow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input data as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Directory of flow JSON files used for sub-flows and tools
        #[arg(long)]
        flows_dir: Option<PathBuf>,

        /// Runtime configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Operator id recorded on the run
        #[arg(long, default_value = "cli")]
        operator: String,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a flow file
    Validate {
        /// Path to flow JSON file
        file: PathBuf,
    },

    /// List available node runners
    Nodes,

    /// List built-in tools
    Tools,

    /// Create an example flow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            flows_dir,
            config,
            operator,
            verbose,
        } => {
            init_logging(verbose);
            run_flow(file, input, flows_dir, config, operator).await?;
        }

        Commands::Validate { file } => {
            init_logging(false);
            validate_flow(&file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Tools => {
            list_tools();
        }

        Commands::Init { output } => {
            create_example_flow(&output)?;
        }
    }

    Ok(())
}

fn read_flow(file: &Path) -> Result<Flow> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let flow: Flow = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a flow definition", file.display()))?;
    Ok(flow)
}

fn parse_inputs(input: Option<String>) -> Result<HashMap<String, Value>> {
    let Some(input) = input else {
        return Ok(HashMap::new());
    };
    let json: serde_json::Value = serde_json::from_str(&input).context("input is not valid JSON")?;
    match Value::from(json) {
        Value::Object(map) => Ok(map),
        _ => bail!("Input must be a JSON object"),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<RuntimeConfig> {
    let Some(path) = path else {
        return Ok(RuntimeConfig::default());
    };
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not a runtime config", path.display()))
}

async fn run_flow(
    file: PathBuf,
    input: Option<String>,
    flows_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    operator: String,
) -> Result<()> {
    println!("🚀 Loading flow from: {}", file.display());

    let flow = read_flow(&file)?;
    println!("📋 Flow: {} ({} {})", flow.name, flow.code, flow.version);
    println!("   Nodes: {}", flow.nodes.len());
    println!();

    let inputs = parse_inputs(input)?;
    let config = load_config(config)?;

    let mut runtime = FlowRuntime::with_config(flownodes::default_registry(), config)
        .with_capabilities(Capabilities::new().with_model(Arc::new(EchoModelAdapter)));
    if let Some(dir) = flows_dir {
        runtime = runtime.with_loader(Arc::new(DirectoryFlowLoader::new(dir)));
    }

    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::RunStarted { flow_code, depth, .. } => {
                    println!("▶️  Run of {} started (depth {})", flow_code, depth);
                }
                ExecutionEvent::NodeStarted { node_id, node_type, .. } => {
                    println!("  ⚡ Starting node: {} ({})", node_id, node_type);
                }
                ExecutionEvent::NodeCompleted { node_id, duration_ms, .. } => {
                    println!("  ✅ Node {} completed in {}ms", node_id, duration_ms);
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    println!("  ❌ Node {} failed: {}", node_id, error);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => println!("     ℹ️  [{}] {}", node_id, message),
                    NodeEvent::Warning { message } => println!("     ⚠️  [{}] {}", node_id, message),
                    NodeEvent::Data { key, value } => {
                        println!("     📎 [{}] {} = {}", node_id, key, value.to_display_string())
                    }
                },
                ExecutionEvent::RunCompleted { flow_code, status, duration_ms, .. } => {
                    println!("🏁 Run of {} finished ({}) in {}ms", flow_code, status, duration_ms);
                }
            }
        }
    });

    let cancellation = CancellationToken::new();
    let on_interrupt = cancellation.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Interrupted, cancelling run");
        on_interrupt.cancel();
    });

    let mut data = ExecutionData::new(Trigger::manual(), Operator::user(operator), inputs);
    let result = runtime.execute(&flow, &mut data, cancellation).await;

    // let queued events print before the summary
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    let trace = result?;

    println!();
    println!("📊 Execution Summary:");
    println!("   Run ID: {}", trace.run_id);
    println!("   Status: {}", trace.status.as_str());
    println!("   Nodes executed: {}", trace.len());

    if trace.status == RunStatus::PartiallyFailed {
        println!();
        println!("💥 Failed nodes:");
        for entry in trace.failures() {
            if let Some(error) = &entry.result.error {
                println!("   {} [{}]: {}", entry.node_id, error.kind, error.message);
            }
        }
    }

    if let Some(output) = &trace.output {
        println!();
        println!("📤 Output:");
        let json = serde_json::to_string_pretty(&serde_json::Value::from(output.clone()))?;
        println!("{}", json);
    }

    Ok(())
}

fn validate_flow(file: &Path) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());

    let flow = read_flow(file)?;
    let runtime = FlowRuntime::new(flownodes::default_registry());
    let report = runtime
        .validate(&flow)
        .with_context(|| format!("flow '{}' is invalid", flow.code))?;

    println!("✅ Flow is valid:");
    println!("   Name: {}", flow.name);
    println!("   Nodes: {}", flow.nodes.len());
    for warning in &report.warnings {
        println!("   ⚠️  {}", warning);
    }

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    for info in flownodes::default_registry().list() {
        println!(
            "  • {} {} ({})",
            info.node_type, info.version, info.metadata.category
        );
        println!("    {}", info.metadata.description);
    }
}

fn list_tools() {
    println!("🧰 Built-in Tools:");
    println!();

    for tool in flownodes::ToolBox::standard().list() {
        let inputs: Vec<String> = tool
            .inputs()
            .iter()
            .map(|f| format!("{}: {}", f.name, f.field_type.as_str()))
            .collect();
        println!("  • {}({})", tool.name(), inputs.join(", "));
        println!("    {}", tool.description());
    }
}

fn create_example_flow(output: &Path) -> Result<()> {
    let example = json!({
        "code": "greet",
        "name": "Greeting",
        "description": "Greets by name and reports the greeting length",
        "entry": "start",
        "input_schema": [
            {"name": "name", "type": "string", "required": true},
            {"name": "shout", "type": "boolean", "default": false}
        ],
        "output_schema": [
            {"name": "greeting", "type": "string", "required": true},
            {"name": "words", "type": "integer"}
        ],
        "nodes": [
            {"node_id": "start", "type": "start", "next_nodes": ["check"]},
            {"node_id": "check", "type": "if", "params": {"branches": [
                {"id": "loud", "condition": {"kind": "reference", "path": "input.shout"}, "next_nodes": ["loud"]},
                {"id": "calm", "else": true, "next_nodes": ["calm"]}
            ]}},
            {"node_id": "loud", "type": "assign", "next_nodes": ["count"], "params": {"assignments": [
                {"variable": "greeting", "value": {"kind": "template", "template": "HELLO {{input.name}}!"}}
            ]}},
            {"node_id": "calm", "type": "assign", "next_nodes": ["count"], "params": {"assignments": [
                {"variable": "greeting", "value": {"kind": "template", "template": "Hello {{input.name}}"}}
            ]}},
            {"node_id": "count", "type": "tool", "next_nodes": ["end"], "params": {
                "tool": "text_length",
                "inputs": {"text": {"kind": "reference", "path": "var.greeting"}}
            }},
            {"node_id": "end", "type": "end", "params": {"outputs": {
                "words": {"kind": "reference", "path": "nodes.count.words"}
            }}}
        ]
    });

    let flow: Flow = serde_json::from_value(example)?;
    let json = serde_json::to_string_pretty(&flow)?;
    std::fs::write(output, json)?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  flow run --file {} --input '{{\"name\": \"Ada\"}}'",
        output.display()
    );

    Ok(())
}
