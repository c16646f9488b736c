use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ospace_types::ArtifactKind;

#[derive(Parser)]
#[command(
    name = "ospace",
    about = "Inspect and edit a persisted object space",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Checkpoint log holding the space.
    #[arg(long, global = true, default_value = "ospace.log")]
    pub log: PathBuf,

    /// TOML file with `[space]` and `[log]` tables.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List artifacts
    Ls,
    /// Print an artifact's contents
    Show(IdArgs),
    /// Create an artifact
    Create(CreateArgs),
    /// Delete an artifact
    Delete(IdArgs),
    /// Set a value cell
    Set(ValueArgs),
    /// Write an array/list index or a dictionary key
    Put(PutArgs),
    /// Push onto a stack or append to a list
    Push(ValueArgs),
    /// Pop from a stack or the end of a list
    Pop(IdArgs),
    /// Append to a queue
    Enqueue(ValueArgs),
    /// Take the oldest queue element
    Dequeue(IdArgs),
    /// Add a set member
    Add(ValueArgs),
    /// Remove a set member, list element or dictionary key
    Remove(ValueArgs),
    /// Commit a checkpoint without changing anything
    Checkpoint(CheckpointArgs),
}

#[derive(Args)]
pub struct IdArgs {
    pub id: String,
}

#[derive(Args)]
pub struct CreateArgs {
    pub kind: ArtifactKind,
    pub id: String,
    /// Array length.
    #[arg(long, default_value = "0")]
    pub length: usize,
    /// Initial content of a value cell.
    #[arg(long, default_value = "")]
    pub value: String,
}

#[derive(Args)]
pub struct ValueArgs {
    pub id: String,
    pub value: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub id: String,
    /// Index for arrays and lists, key for dictionaries.
    pub key: String,
    pub value: String,
}

#[derive(Args)]
pub struct CheckpointArgs {
    /// Write a full checkpoint instead of the configured kind.
    #[arg(long)]
    pub full: bool,
}
