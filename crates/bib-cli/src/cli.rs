use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "bibliograph",
    about = "Bibliograph: keyed JSON records with change detection and delta history",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (default: ./.bibliograph.config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage root; overrides Bibliograph-Storage-FS-Path
    #[arg(long, global = true)]
    pub storage: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a source keyspace
    #[command(visible_aliases = ["sc", "scr"], alias = "source_create")]
    SourceCreate(SourceArgs),
    /// Check whether a source exists
    #[command(visible_alias = "sch", alias = "source_check")]
    SourceCheck(SourceArgs),
    /// Read a record by GUID
    #[command(visible_alias = "r", aliases = ["record-read", "record_read"])]
    Read(ReadArgs),
    /// Write record(s) from a JSON file
    #[command(visible_alias = "w", aliases = ["record-write", "record_write"])]
    Write(WriteArgs),
    /// Delete a record by GUID
    #[command(visible_alias = "d", aliases = ["record-delete", "record_delete"])]
    Delete(RecordArgs),
    /// List record GUIDs, optionally by last-touched time
    Keys(KeysArgs),
    /// Show a record's metadata
    Metadata(RecordArgs),
    /// Show a record's delta history
    History(RecordArgs),
    /// Print the effective configuration
    #[command(name = "explain-config", alias = "config")]
    ExplainConfig,
}

#[derive(Args)]
pub struct SourceArgs {
    pub source: String,
}

#[derive(Args)]
pub struct RecordArgs {
    pub guid: String,
    /// Source to use (default: Bibliograph-Source from config)
    #[arg(short, long)]
    pub source: Option<String>,
}

#[derive(Args)]
pub struct ReadArgs {
    pub guid: String,
    #[arg(short, long)]
    pub source: Option<String>,
    /// Also write the record to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct WriteArgs {
    /// File holding one record object or an array of them
    #[arg(short, long)]
    pub input: PathBuf,
    #[arg(short, long)]
    pub source: Option<String>,
    /// GUID template such as `Book-{ISBN}`; default is the MD5 of the record JSON
    #[arg(short = 'g', long = "guid")]
    pub guid_template: Option<String>,
}

#[derive(Args)]
pub struct KeysArgs {
    #[arg(short, long)]
    pub source: Option<String>,
    /// Lower bound, RFC 3339 or epoch milliseconds
    #[arg(long)]
    pub from: Option<String>,
    /// Upper bound, RFC 3339 or epoch milliseconds (default: now)
    #[arg(long)]
    pub to: Option<String>,
}
