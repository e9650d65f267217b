//! bsi admin binary
//!
//! Inspects and queries column indexes persisted in the configured store.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bsi::config::{AppConfig, LogFormat};
use bsi::relation::{ColumnIndex, IndexRelation};
use bsi::storage::{create_storage, StorageBackend};
use bsi::types::{CmpOp, RowId, Value, ValueKind};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the column indexes of the configured table
    Columns,
    /// Create and persist an empty column index
    Create {
        column: String,
        /// signed or unsigned
        kind: ValueKind,
        /// Magnitude width, defaults to index.default_bit_width
        #[arg(long)]
        bit_width: Option<u8>,
    },
    /// Store a value for a row and persist the column
    Set {
        column: String,
        row: RowId,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Print width, kind and plane statistics of a stored index
    Inspect { key: String },
    /// Print the value a row holds
    Get { key: String, row: RowId },
    /// Print the rows matching `<op> <value>`
    Query {
        key: String,
        op: String,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;

    init_tracing(&config)?;

    let storage_config = config
        .storage_runtime()
        .context("invalid storage configuration")?;
    let storage: Arc<dyn StorageBackend> = Arc::from(create_storage(storage_config)?);

    let output = match cli.command {
        Command::Columns => {
            let relation = IndexRelation::open(config.index.table.clone(), storage).await?;
            let columns: Vec<_> = relation
                .columns()
                .into_iter()
                .map(|(name, kind)| {
                    let key = relation.key(&name, kind);
                    json!({ "column": name, "kind": kind, "key": key })
                })
                .collect();
            json!({ "table": relation.table(), "columns": columns })
        }
        Command::Create {
            column,
            kind,
            bit_width,
        } => {
            let relation = IndexRelation::open(config.index.table.clone(), storage).await?;
            let bit_width = config.index.bit_width_or_default(bit_width);
            relation.create_column(&column, kind, bit_width)?;
            relation.flush(&column).await?;
            json!({
                "key": relation.key(&column, kind),
                "kind": kind,
                "bit_width": bit_width,
            })
        }
        Command::Set { column, row, value } => {
            let relation = IndexRelation::open(config.index.table.clone(), storage).await?;
            let kind = relation.snapshot(&column)?.kind();
            let value = Value::parse(kind, &value)?;
            relation.set(&column, row, value).await?;
            relation.flush(&column).await?;
            json!({ "key": relation.key(&column, kind), "row": row, "value": value })
        }
        Command::Inspect { key } => {
            let (index, bytes) = load_index(storage.as_ref(), &key).await?;
            json!({
                "key": key,
                "kind": index.kind(),
                "bit_width": index.bit_width(),
                "rows": index.cardinality(),
                "bytes": bytes,
                "planes": index.plane_cardinalities(),
            })
        }
        Command::Get { key, row } => {
            let (index, _) = load_index(storage.as_ref(), &key).await?;
            json!({ "key": key, "row": row, "value": index.get(row)? })
        }
        Command::Query { key, op, value } => {
            let (index, _) = load_index(storage.as_ref(), &key).await?;
            let op: CmpOp = op.parse()?;
            let value = Value::parse(index.kind(), &value)?;
            let rows = index.compare(op, value)?;
            tracing::debug!(%key, ?op, %value, hits = rows.len(), "Query evaluated");
            json!({ "key": key, "hits": rows.len(), "rows": rows.iter().collect::<Vec<_>>() })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn load_index(
    storage: &dyn StorageBackend,
    key: &str,
) -> anyhow::Result<(ColumnIndex, usize)> {
    let kind = ValueKind::from_key(key)
        .ok_or_else(|| anyhow!("key {:?} does not end in .I or .U", key))?;
    let data = storage
        .get(key)
        .await
        .with_context(|| format!("failed to read {}", key))?;
    let index = ColumnIndex::from_bytes(kind, &data)
        .with_context(|| format!("failed to decode {}", key))?;
    Ok((index, data.len()))
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.logging.level.clone()))
        .unwrap_or_else(|_| EnvFilter::new("bsi=info"));

    // stdout carries the command output, logs go to stderr
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format {
        LogFormat::Json => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        LogFormat::Text => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
