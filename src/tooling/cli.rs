//! CLI Tooling
//!
//! Space-scoped commands over the persistence layer. Every command runs to completion
//! on a private Tokio runtime and returns its output as a string.

use crate::blob::{BlobId, BlobStore};
use crate::config::{ConfigLoader, SpacekeepConfig};
use crate::error::ApiError;
use crate::op::{encode_line, Operation, OpsParser, PropertyUpdate, PropertyValue};
use crate::persist::{FileSystemPersistence, PersistenceQueue, SpacePersistence};
use crate::space::{validate_component, SpaceLayout};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::info;

/// Spacekeep CLI - durable storage for replicated vertex trees
#[derive(Parser)]
#[command(name = "spacekeep")]
#[command(about = "Operation logs, secrets and blobs for a local space directory")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Space root directory
    #[arg(long, default_value = ".")]
    pub space: PathBuf,

    /// Configuration file layered over the space's spacekeep.toml
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create the space layout and manifest (idempotent)
    Init {
        /// Space id; defaults to the directory name
        #[arg(long)]
        id: Option<String>,
        /// Human-readable name
        #[arg(long)]
        name: Option<String>,
    },
    /// Content-addressed blob storage
    Blob {
        #[command(subcommand)]
        command: BlobCommands,
    },
    /// Print the operation log of a tree
    Ops {
        tree_id: String,
        /// Output format (text or jsonl)
        #[arg(long, default_value = "text")]
        format: String,
        /// Only ops from this origin. jsonl lines carry no origin, so jsonl output
        /// needs this whenever the tree has ops from more than one origin.
        #[arg(long)]
        origin: Option<String>,
    },
    /// Append operations from a JSONL file to a tree's log
    Import {
        tree_id: String,
        /// Origin the operations are attributed to
        origin: String,
        file: PathBuf,
    },
    /// Manage space secrets
    Secrets {
        #[command(subcommand)]
        command: SecretsCommands,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum BlobCommands {
    /// Store a file and print its id
    Put {
        file: PathBuf,
        #[arg(long)]
        mime_type: Option<String>,
    },
    /// Write a blob's bytes to a file
    Get {
        id: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Check whether a blob is stored
    Exists { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SecretsCommands {
    /// List stored secret keys
    List {
        /// Print values instead of masking them
        #[arg(long)]
        show_values: bool,
    },
    /// Store a secret
    Set { key: String, value: String },
}

/// Execution context for one space
pub struct CliContext {
    layout: SpaceLayout,
    config: SpacekeepConfig,
    runtime: Runtime,
}

impl CliContext {
    pub fn new(space_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load_with_file(&space_root, config_path.as_deref())?;
        Self::with_config(space_root, config)
    }

    pub fn with_config(space_root: PathBuf, config: SpacekeepConfig) -> Result<Self, ApiError> {
        config.validate()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to start runtime: {}", e)))?;
        Ok(Self {
            layout: SpaceLayout::new(space_root),
            config,
            runtime,
        })
    }

    pub fn config(&self) -> &SpacekeepConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Init { id, name } => self.init(id.as_deref(), name.as_deref()),
            Commands::Blob { command } => self.runtime.block_on(self.blob(command)),
            Commands::Ops {
                tree_id,
                format,
                origin,
            } => self
                .runtime
                .block_on(self.ops(tree_id, format, origin.as_deref())),
            Commands::Import {
                tree_id,
                origin,
                file,
            } => self.runtime.block_on(self.import(tree_id, origin, file)),
            Commands::Secrets { command } => self.runtime.block_on(self.secrets(command)),
        }
    }

    fn init(&self, id: Option<&str>, name: Option<&str>) -> Result<String, ApiError> {
        let id = match id {
            Some(id) => id.to_string(),
            None => self
                .layout
                .root()
                .canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .ok_or_else(|| {
                    ApiError::InvalidArgument(
                        "cannot derive a space id from the directory; pass --id".to_string(),
                    )
                })?,
        };
        let manifest = self.layout.init(&id, name)?;
        Ok(format!(
            "Space {} at {}",
            manifest.id,
            self.layout.root().display()
        ))
    }

    /// Must run inside the runtime: the parser spawns its router task.
    fn open_store(&self) -> Result<Arc<FileSystemPersistence>, ApiError> {
        let parser = Arc::new(OpsParser::spawn(self.config.parser.timeout())?);
        Ok(Arc::new(FileSystemPersistence::open(
            self.layout.clone(),
            parser,
        )?))
    }

    async fn blob(&self, command: &BlobCommands) -> Result<String, ApiError> {
        let store = BlobStore::new(self.layout.files_dir());
        match command {
            BlobCommands::Put { file, mime_type } => {
                let bytes = tokio::fs::read(file).await.map_err(|e| {
                    ApiError::InvalidArgument(format!("cannot read {}: {}", file.display(), e))
                })?;
                let blob = store.put_bytes(&bytes, mime_type.as_deref()).await?;
                Ok(blob.id.to_string())
            }
            BlobCommands::Get { id, out } => {
                let id = BlobId::parse(id)?;
                let bytes = store.get_bytes(&id).await?;
                tokio::fs::write(out, &bytes)
                    .await
                    .map_err(crate::error::StorageError::from)?;
                Ok(format!("Wrote {} bytes to {}", bytes.len(), out.display()))
            }
            BlobCommands::Exists { id } => {
                let id = BlobId::parse(id)?;
                Ok(store.exists(&id).await?.to_string())
            }
        }
    }

    async fn ops(
        &self,
        tree_id: &str,
        format: &str,
        origin: Option<&str>,
    ) -> Result<String, ApiError> {
        validate_component("tree id", tree_id)?;
        let store = self.open_store()?;
        let mut ops = store.get_tree_ops(store.space_id(), tree_id).await?;
        if let Some(origin) = origin {
            ops.retain(|op| op.origin_id() == origin);
        }

        match format {
            "jsonl" => {
                let mut origins: Vec<&str> = ops.iter().map(Operation::origin_id).collect();
                origins.sort_unstable();
                origins.dedup();
                if origins.len() > 1 {
                    return Err(ApiError::InvalidArgument(format!(
                        "tree {} has ops from origins {}; pick one with --origin",
                        tree_id,
                        origins.join(", ")
                    )));
                }
                Ok(ops.iter().map(encode_line).collect::<Vec<_>>().join("\n"))
            }
            "text" => Ok(format_ops_table(&ops)),
            other => Err(ApiError::InvalidArgument(format!(
                "unknown format {:?} (expected text or jsonl)",
                other
            ))),
        }
    }

    async fn import(
        &self,
        tree_id: &str,
        origin: &str,
        file: &Path,
    ) -> Result<String, ApiError> {
        validate_component("tree id", tree_id)?;
        validate_component("origin id", origin)?;
        let text = tokio::fs::read_to_string(file).await.map_err(|e| {
            ApiError::InvalidArgument(format!("cannot read {}: {}", file.display(), e))
        })?;
        let lines: Vec<String> = text.lines().map(str::to_string).collect();

        let store = self.open_store()?;
        let ops = store.parser().parse_lines(lines, origin).await?;
        let count = ops.len();

        let queue = PersistenceQueue::new(store.space_id(), store.clone());
        queue.add_ops(tree_id, ops);
        let report = queue.save_data().await;
        if let Some((_, reason)) = report.trees_failed.first() {
            return Err(ApiError::SaveFailed(format!(
                "operations for {}: {}",
                tree_id, reason
            )));
        }

        info!(tree_id, origin, count, "Imported operations");
        Ok(format!("Imported {} operations into {}", count, tree_id))
    }

    async fn secrets(&self, command: &SecretsCommands) -> Result<String, ApiError> {
        let store = self.open_store()?;
        match command {
            SecretsCommands::List { show_values } => {
                let secrets = store.get_all_secrets(store.space_id()).await?;
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Key", "Value"]);
                for (key, value) in &secrets {
                    let shown = if *show_values {
                        value.clone()
                    } else {
                        "*".repeat(value.chars().count().min(8))
                    };
                    table.add_row(vec![key.clone(), shown]);
                }
                Ok(table.to_string())
            }
            SecretsCommands::Set { key, value } => {
                let queue = PersistenceQueue::new(store.space_id(), store.clone());
                queue.add_secret(key.clone(), value.clone());
                let report = queue.save_data().await;
                match report.secrets_error {
                    Some(reason) => Err(ApiError::SaveFailed(format!(
                        "secret {}: {}",
                        key, reason
                    ))),
                    None => Ok(format!("Saved secret {}", key)),
                }
            }
        }
    }
}

fn format_ops_table(ops: &[Operation]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Id", "Kind", "Target", "Detail"]);
    for op in ops {
        let detail = match op {
            Operation::Move(m) => match &m.parent_id {
                Some(parent) => format!("parent = {}", parent),
                None => "parent = (none)".to_string(),
            },
            Operation::SetProperty(p) => match &p.value {
                PropertyUpdate::Set(value) => format!("{} = {}", p.key, format_value(value)),
                PropertyUpdate::Clear => format!("{} cleared", p.key),
            },
        };
        let kind = match op {
            Operation::Move(_) => "move",
            Operation::SetProperty(_) => "set",
        };
        table.add_row(vec![
            op.id().to_string(),
            kind.to_string(),
            op.target_id().to_string(),
            detail,
        ]);
    }
    table.to_string()
}

fn format_value(value: &PropertyValue) -> String {
    match value {
        PropertyValue::String(s) => format!("{:?}", s),
        PropertyValue::Number(n) => n.to_string(),
        PropertyValue::Boolean(b) => b.to_string(),
        PropertyValue::StringArray(items) => format!("{:?}", items),
        PropertyValue::NumberArray(items) => format!(
            "[{}]",
            items.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", ")
        ),
        PropertyValue::BooleanArray(items) => format!("{:?}", items),
    }
}
