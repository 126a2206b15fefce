//! graph-cache-inspect - inspect an extracted cache snapshot
//!
//! Usage:
//!   graph-cache-inspect <snapshot.json> [--query <file>] [--root <id>] [--variables <json>]
//!
//! Prints node and reference counts and the integrity check. With `--query`,
//! reads the query from the snapshot and prints `{result, complete}`.
//! Log level comes from `GRAPH_CACHE_LOG`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use graph_cache::serialization::load;
use graph_cache::{read, CacheContext, JsonValue, RawOperation};

struct Args {
    snapshot: PathBuf,
    query: Option<PathBuf>,
    root: Option<String>,
    variables: Option<String>,
}

fn flag(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_args() -> Option<Args> {
    let args: Vec<String> = std::env::args().collect();
    let snapshot = args.get(1).filter(|a| !a.starts_with("--"))?;
    Some(Args {
        snapshot: PathBuf::from(snapshot),
        query: flag(&args, "--query").map(PathBuf::from),
        root: flag(&args, "--root"),
        variables: flag(&args, "--variables"),
    })
}

fn usage() {
    eprintln!("Usage: graph-cache-inspect <snapshot.json> [--query <file>] [--root <id>] [--variables <json>]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <snapshot.json>  Extracted snapshot file");
    eprintln!("  --query          Query document to read from the snapshot");
    eprintln!("  --root           Node id the query is rooted at (default: operation root)");
    eprintln!("  --variables      Query variables as a JSON object");
}

fn run(args: Args) -> Result<()> {
    let snapshot = load(&args.snapshot).with_context(|| format!("Failed to load {:?}", args.snapshot))?;

    let stats = snapshot.stats();
    println!("nodes: {}", snapshot.len());
    println!("  entities: {}", stats.entities);
    println!("  parameterized values: {}", stats.parameterized_values);
    println!("references: {}", stats.references);
    match snapshot.check_integrity() {
        Ok(()) => println!("integrity: ok"),
        Err(problems) => {
            println!("integrity: {} problems", problems.len());
            for problem in problems {
                println!("  {}", problem);
            }
        }
    }

    let Some(query_path) = args.query else {
        return Ok(());
    };
    let document = std::fs::read_to_string(&query_path).with_context(|| format!("Failed to read {:?}", query_path))?;

    let mut operation = RawOperation::query(document);
    if let Some(root) = args.root {
        snapshot.node(&root)?;
        operation = operation.with_root(root);
    }
    if let Some(variables) = args.variables {
        let value: serde_json::Value = serde_json::from_str(&variables).context("Invalid --variables JSON")?;
        match JsonValue::from(value).as_object() {
            Some(variables) => operation = operation.with_variables(variables.clone()),
            None => bail!("--variables must be a JSON object"),
        }
    }

    let context = CacheContext::default();
    let query = context.parse_operation(&operation)?;
    let result = read(&query, &snapshot, false);

    let output = serde_json::json!({
        "result": result.result.as_ref().map(serde_json::Value::from),
        "complete": result.complete,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("GRAPH_CACHE_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let Some(args) = parse_args() else {
        usage();
        std::process::exit(1);
    };
    run(args)
}
