//! Command-line argument structures and enums

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use blockpad_core::model::BlockType;

#[derive(Parser)]
#[command(name = "blockpad")]
#[command(version)]
#[command(about = "Pages of typed blocks, stored locally", long_about = None)]
pub struct Cli {
    /// Use this config file instead of the default location
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a config file selecting the storage backend
    Init {
        /// Storage backend
        #[arg(short, long, value_enum, default_value_t = Backend::Json)]
        backend: Backend,

        /// Data directory (json) or database file (sqlite)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Autosave debounce window in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,
    },

    /// Show current configuration
    Config,

    /// Page management commands
    #[command(alias = "p")]
    Page {
        #[command(subcommand)]
        command: PageCommands,
    },

    /// Append a block to a page
    Write {
        /// Page id
        page: String,

        /// Block type (paragraph, heading1, bulletList, ...)
        #[arg(short = 't', long = "type", default_value = "paragraph", value_parser = parse_block_type)]
        block_type: BlockType,

        /// Block text
        text: String,
    },

    /// Replace a page's content with a markdown-like text file
    Import {
        /// Page id
        page: String,

        /// File to read
        file: PathBuf,
    },

    /// Print a page as markdown-like text
    Export {
        /// Page id
        page: String,
    },

    /// Show storage and save status
    Status,
}

#[derive(Subcommand)]
pub enum PageCommands {
    /// List all pages
    #[command(alias = "ls")]
    List,

    /// Create a page
    Create {
        /// Page title (default: config's default_page_title)
        title: Option<String>,

        /// Page icon (usually an emoji)
        #[arg(short, long)]
        icon: Option<String>,
    },

    /// Change a page's title
    Rename {
        /// Page id
        id: String,

        /// New title
        title: String,
    },

    /// Delete a page and all of its blocks
    #[command(alias = "rm")]
    Delete {
        /// Page id
        id: String,
    },

    /// Show a page's blocks
    Show {
        /// Page id
        id: String,

        /// Print the stored blocks as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Memory,
    Json,
    Sqlite,
}

fn parse_block_type(value: &str) -> Result<BlockType, String> {
    value.parse::<BlockType>().map_err(|e| e.to_string())
}
