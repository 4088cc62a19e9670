mod host;

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::info;

use actiongraph_compiler::{Compiler, OperationSet};
use actiongraph_config::{ActionsFile, KeysMode, MissingPolicy, RuntimeOptions};
use actiongraph_ir::Catalog;
use actiongraph_runtime::{DispatchRequest, MemoryDataStore, Runtime};
use actiongraph_store::{SqliteStore, Store};

use crate::host::DemoHost;

/// Actiongraph - compile action templates and run them
#[derive(Parser)]
#[command(name = "actiongraph")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.actiongraph)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Fail when a dispatched action or sequence is not registered
  #[arg(long, global = true)]
  strict: bool,

  /// Key `$keys` results by the last matched path segment
  #[arg(long, global = true)]
  legacy_keys: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile an actions file and print the catalog
  Compile {
    /// Path to the actions file (JSON)
    actions_file: PathBuf,
  },

  /// Compile an actions file into the catalog database
  Save {
    /// Path to the actions file (JSON)
    actions_file: PathBuf,
  },

  /// Dispatch an action with a payload read from stdin
  Run {
    /// Path to the actions file (JSON); omit with --from-db
    actions_file: Option<PathBuf>,

    /// The action ID to dispatch
    #[arg(long)]
    action: String,

    /// Load the catalog from the database instead of an actions file
    #[arg(long)]
    from_db: bool,

    /// Values for `map/actionValue` (JSON)
    #[arg(long)]
    action_values: Option<String>,
  },
}

fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();

  let data_dir = match cli.data_dir.clone() {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".actiongraph"),
  };

  match cli.command {
    Some(Commands::Compile { ref actions_file }) => compile(actions_file)?,
    Some(Commands::Save { ref actions_file }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { save(actions_file, &data_dir).await })?;
    }
    Some(Commands::Run {
      ref actions_file,
      ref action,
      from_db,
      ref action_values,
    }) => {
      let source = match (actions_file, from_db) {
        (_, true) => CatalogSource::Database,
        (Some(path), false) => CatalogSource::File(path.clone()),
        (None, false) => bail!("an actions file is required unless --from-db is given"),
      };
      let action_values = match action_values {
        Some(raw) => serde_json::from_str(raw).context("failed to parse --action-values JSON")?,
        None => Value::Null,
      };
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run(&cli, source, action, action_values, &data_dir).await })?;
    }
    None => {
      println!("actiongraph - use --help to see available commands");
    }
  }

  Ok(())
}

fn init_tracing() {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .try_init();
}

enum CatalogSource {
  File(PathBuf),
  Database,
}

fn read_actions_file(path: &Path) -> Result<ActionsFile> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read actions file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse actions file: {}", path.display()))
}

fn compiler_for(file: &ActionsFile) -> Compiler {
  let mut operations = OperationSet::with_operations(DemoHost::operations());
  for def in &file.operations {
    operations.register(def.clone());
  }
  Compiler::new(operations)
}

fn build_catalog(file: &ActionsFile) -> Result<Catalog> {
  compiler_for(file)
    .build_catalog(&file.actions)
    .context("failed to compile actions")
}

fn compile(actions_file: &Path) -> Result<()> {
  let file = read_actions_file(actions_file)?;
  let catalog = build_catalog(&file)?;
  println!("{}", serde_json::to_string_pretty(&catalog.snapshot())?);
  Ok(())
}

async fn save(actions_file: &Path, data_dir: &Path) -> Result<()> {
  let file = read_actions_file(actions_file)?;
  let snapshot = build_catalog(&file)?.snapshot();

  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;
  let db_path = data_dir.join("catalog.db");
  let store = SqliteStore::open(&db_path)
    .await
    .with_context(|| format!("failed to open catalog database: {}", db_path.display()))?;
  store
    .save_catalog(&snapshot)
    .await
    .context("failed to save catalog")?;

  eprintln!(
    "Saved {} actions to {}",
    snapshot.actions.len(),
    db_path.display()
  );
  Ok(())
}

async fn run(
  cli: &Cli,
  source: CatalogSource,
  action: &str,
  action_values: Value,
  data_dir: &Path,
) -> Result<()> {
  let (catalog, mut options) = match source {
    CatalogSource::File(path) => {
      let file = read_actions_file(&path)?;
      (build_catalog(&file)?, file.runtime)
    }
    CatalogSource::Database => {
      let db_path = data_dir.join("catalog.db");
      let store = SqliteStore::open(&db_path)
        .await
        .with_context(|| format!("failed to open catalog database: {}", db_path.display()))?;
      let snapshot = store
        .load_catalog()
        .await
        .context("failed to load catalog")?;
      let catalog = Catalog::from_snapshot(snapshot).context("stored catalog is inconsistent")?;
      (catalog, RuntimeOptions::default())
    }
  };

  if cli.strict {
    options.missing = MissingPolicy::Strict;
  }
  if cli.legacy_keys {
    options.keys_mode = KeysMode::LastSegment;
  }

  let payload = read_payload_from_stdin()?;
  eprintln!("Payload: {}", payload);

  let data = Arc::new(MemoryDataStore::new());
  let runtime = Runtime::new(Arc::new(catalog), Arc::new(DemoHost), data.clone(), options);

  let request = DispatchRequest::new(action, payload).with_action_values(action_values);
  let Some(dispatch) = runtime.dispatch(&request).context("dispatch failed")? else {
    eprintln!("Action '{}' is not registered, nothing ran", action);
    return Ok(());
  };

  info!(dispatch_id = %dispatch.dispatch_id(), pending = dispatch.pending().len(), "waiting for results");
  let results = dispatch.wait().await.context("asynchronous operation failed")?;

  let results: serde_json::Map<String, Value> = results
    .into_iter()
    .map(|(index, value)| (index.to_string(), value))
    .collect();
  let output = json!({
    "results": results,
    "data": data.snapshot(),
  });
  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
}

fn read_payload_from_stdin() -> Result<Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    Ok(json!({}))
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read payload from stdin")?;

    if input.trim().is_empty() {
      Ok(json!({}))
    } else {
      serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
    }
  }
}
