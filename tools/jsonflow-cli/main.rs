use clap::{Parser, Subcommand};
use jsonflow::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Run, compile and analyze JSONFlow documents
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a flow with the interpreter
    Run {
        /// Path to the flow JSON file
        flow: PathBuf,
        /// Inputs as a JSON object, or a path to a file holding one
        #[arg(short, long)]
        context: Option<String>,
        /// Write the result and final context here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Log every engine event
        #[arg(long)]
        debug: bool,
    },
    /// Generate source code for a target language
    Compile {
        /// Path to the flow JSON file
        flow: PathBuf,
        /// python, javascript, rust or solidity
        #[arg(short, long)]
        target: String,
        /// Write the generated source here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Compile even if the target's whitelist rejects a step
        #[arg(long)]
        skip_whitelist: bool,
    },
    /// Print cost, determinism and backend support for a flow
    Analyze {
        /// Path to the flow JSON file
        flow: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let debug = matches!(cli.command, Command::Run { debug: true, .. });
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run {
            flow,
            context,
            output,
            ..
        } => run(&flow, context.as_deref(), output.as_ref()),
        Command::Compile {
            flow,
            target,
            output,
            skip_whitelist,
        } => compile(&flow, &target, output.as_ref(), skip_whitelist),
        Command::Analyze { flow } => analyze_flow(&flow),
    }
}

fn load_flow(path: &PathBuf) -> Flow {
    let text = fs::read_to_string(path).unwrap_or_else(|e| {
        exit_with_error(&format!("Failed to read flow file '{}': {}", path.display(), e))
    });
    Flow::from_json(&text).unwrap_or_else(|e| exit_with_error(&e.to_string()))
}

/// Accepts inline JSON or a path to a JSON file.
fn load_inputs(context: Option<&str>) -> IndexMap<String, Value> {
    let Some(context) = context else {
        return IndexMap::new();
    };
    let text = if context.trim_start().starts_with('{') {
        context.to_string()
    } else {
        fs::read_to_string(context).unwrap_or_else(|e| {
            exit_with_error(&format!("Failed to read context file '{}': {}", context, e))
        })
    };
    serde_json::from_str(&text)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse context JSON: {}", e)))
}

fn run(path: &PathBuf, context: Option<&str>, output: Option<&PathBuf>) {
    let flow = load_flow(path);
    let inputs = load_inputs(context);

    let start = Instant::now();
    let execution = Interpreter::default()
        .execute(&flow, inputs)
        .unwrap_or_else(|e| exit_with_error(&format!("Execution failed: {}", e)));
    tracing::debug!(elapsed = ?start.elapsed(), "execution finished");

    let report = serde_json::json!({
        "result": execution.result,
        "context": execution.context.to_json(),
    });
    write_output(&report_text(&report), output);
}

fn compile(path: &PathBuf, target: &str, output: Option<&PathBuf>, skip_whitelist: bool) {
    let flow = load_flow(path);
    let lang: Lang = target
        .parse()
        .unwrap_or_else(|e: FlowError| exit_with_error(&e.to_string()));
    let source = Compiler::builder()
        .skip_whitelist(skip_whitelist)
        .build()
        .compile(&flow, lang)
        .unwrap_or_else(|e| exit_with_error(&format!("Compilation failed: {}", e)));
    write_output(&source, output);
}

fn analyze_flow(path: &PathBuf) {
    let flow = load_flow(path);
    let report = analyze(&flow);
    let json = serde_json::to_value(&report)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to encode report: {}", e)));
    println!("{}", report_text(&json));
}

fn report_text(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to encode output: {}", e)))
}

fn write_output(text: &str, output: Option<&PathBuf>) {
    match output {
        Some(path) => {
            fs::write(path, text).unwrap_or_else(|e| {
                exit_with_error(&format!("Failed to write '{}': {}", path.display(), e))
            });
            println!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
