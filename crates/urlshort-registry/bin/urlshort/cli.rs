use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use urlshort_registry::{DeletionSettings, RegistrySettings};
use urlshort_storage::StorageSettings;

pub const DATABASE_DSN_ENV: &str = "URLSHORT_DATABASE_DSN";
pub const FILE_STORAGE_PATH_ENV: &str = "URLSHORT_FILE_STORAGE_PATH";
pub const ID_LENGTH_ENV: &str = "URLSHORT_ID_LENGTH";
pub const OPERATION_TIMEOUT_ENV: &str = "URLSHORT_OPERATION_TIMEOUT_MS";
pub const FLUSH_INTERVAL_ENV: &str = "URLSHORT_FLUSH_INTERVAL_MS";

pub const DEFAULT_ID_LENGTH: usize = 8;
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 10_000;

#[derive(Debug, Parser)]
#[command(name = "urlshort", about = "Manage short links in a url registry")]
pub struct CLI {
    /// PostgreSQL connection string. Takes precedence over the file path.
    #[arg(long, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    /// Append-only link file, replayed into memory at startup.
    #[arg(long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    #[arg(long, env = ID_LENGTH_ENV, default_value_t = DEFAULT_ID_LENGTH)]
    pub id_length: usize,

    #[arg(
        long,
        env = OPERATION_TIMEOUT_ENV,
        default_value_t = DEFAULT_OPERATION_TIMEOUT_MS
    )]
    pub operation_timeout_ms: u64,

    #[arg(
        long,
        env = FLUSH_INTERVAL_ENV,
        default_value_t = DEFAULT_FLUSH_INTERVAL_MS
    )]
    pub flush_interval_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten one or more urls
    Shorten {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Owner token recorded with the links
        #[arg(long, default_value = "")]
        owner: String,
    },
    /// Look up a short id
    Resolve { id: String },
    /// List the live links of an owner
    List {
        #[arg(long)]
        owner: String,
    },
    /// Soft-delete links owned by `owner`
    Delete {
        #[arg(long)]
        owner: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Check that storage is reachable
    Ping,
}

impl CLI {
    pub fn storage_settings(&self) -> StorageSettings {
        StorageSettings {
            database_dsn: self.database_dsn.clone(),
            file_path: self.file_storage_path.clone(),
        }
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings::builder()
            .id_length(self.id_length)
            .operation_timeout(Duration::from_millis(self.operation_timeout_ms))
            .deletion(
                DeletionSettings::builder()
                    .flush_interval(Duration::from_millis(self.flush_interval_ms))
                    .build(),
            )
            .build()
    }
}
