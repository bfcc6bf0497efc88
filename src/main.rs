use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;

use mongo_chart::chart::ChartSpec;
use mongo_chart::error::ChartQueryError;
use mongo_chart::intent::ChartType;
use mongo_chart::llm::AnthropicClient;
use mongo_chart::session::Session;
use mongo_chart::store::{DocumentStore, MongoStore};
use mongo_chart::{DEFAULT_SAMPLE_SIZE, profile, resolve_db_name, resolve_mongo_uri};

#[derive(Parser)]
#[command(
    name = "mongo-chart",
    about = "Generate charts from natural language queries over MongoDB"
)]
struct Cli {
    /// MongoDB connection string (default: MONGO_URI)
    #[arg(long)]
    uri: Option<String>,

    /// Database name (default: MONGO_DB_NAME)
    #[arg(long)]
    db: Option<String>,

    /// Output machine-readable JSON (default: human-readable)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List collections in the database
    Collections,
    /// Show the inferred field profile of a collection
    Schema { collection: String },
    /// Generate a chart from a natural language query
    Chart {
        collection: String,
        /// Natural language query (positional, collects remaining args)
        query: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let uri = cli
        .uri
        .clone()
        .or_else(resolve_mongo_uri)
        .ok_or("MongoDB URI is required: pass --uri or set MONGO_URI")?;
    let db = cli
        .db
        .clone()
        .or_else(resolve_db_name)
        .ok_or("Database name is required: pass --db or set MONGO_DB_NAME")?;

    let store = MongoStore::connect(&uri, &db)
        .await
        .map_err(|e| ChartQueryError::Connection(e.to_string()))?;

    match cli.command {
        Command::Collections => {
            let collections = store.list_collections().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&collections)?);
            } else if collections.is_empty() {
                println!("No collections found in {db}.");
            } else {
                for name in collections {
                    println!("{name}");
                }
            }
        }

        Command::Schema { collection } => {
            let profile = profile::profile(&store, &collection, DEFAULT_SAMPLE_SIZE).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            } else if profile.is_empty() {
                println!("No schema could be detected for {collection}.");
            } else {
                for (field, kind) in &profile {
                    println!("{field}: {}", kind.as_str());
                }
            }
        }

        Command::Chart { collection, query } => {
            let query_text = query.join(" ");
            if query_text.trim().is_empty() {
                return Err("Please enter a query.".into());
            }

            // The LLM client is required for charting — fail early if missing.
            let mut llm = AnthropicClient::from_env().map_err(|e| {
                format!("{e}. Set ANTHROPIC_API_KEY to enable natural language queries.")
            })?;
            if let Ok(model) = std::env::var("ANTHROPIC_MODEL") {
                llm = llm.with_model(model);
            }

            let mut session = Session::new(Arc::new(store), Arc::new(llm));
            session.select_collection(&collection).await;

            let spec = session.run(&query_text).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&spec)?);
            } else {
                if let Some(entry) = session.history().last() {
                    println!("Aggregation pipeline:");
                    println!("{}", serde_json::to_string_pretty(&entry.pipeline)?);
                    println!();
                }
                render_chart(&spec);
            }
        }
    }

    Ok(())
}

// ============================================================================
// Terminal Rendering
// ============================================================================

/// Render a chart spec to the terminal. Bar-like charts get a scaled bar
/// listing; everything else falls back to a plain table.
fn render_chart(spec: &ChartSpec) {
    println!("{}", spec.title);
    println!();

    match spec.chart_type {
        ChartType::Bar | ChartType::Pie | ChartType::Line => render_bars(spec),
        _ => render_table(spec),
    }
}

fn render_bars(spec: &ChartSpec) {
    let points: Vec<(String, f64)> = spec
        .rows
        .iter()
        .map(|row| {
            let label = value_to_label(row.get(&spec.x_field));
            let value = spec
                .y_field
                .as_deref()
                .and_then(|y| row.get(y))
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            (label, value)
        })
        .collect();

    let max = points.iter().map(|(_, v)| *v).fold(0.0, f64::max);
    let label_width = points.iter().map(|(l, _)| l.len()).max().unwrap_or(0);

    for (label, value) in &points {
        let width = if max > 0.0 {
            ((value / max) * 40.0).round() as usize
        } else {
            0
        };
        println!("{label:<label_width$}  {value:>10}  {}", "#".repeat(width));
    }
}

fn render_table(spec: &ChartSpec) {
    for row in &spec.rows {
        let x = value_to_label(row.get(&spec.x_field));
        match spec.y_field.as_deref().and_then(|y| row.get(y)) {
            Some(y) => println!("{x}  {}", value_to_label(Some(y))),
            None => println!("{x}"),
        }
    }
}

fn value_to_label(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "?".to_string(),
    }
}
