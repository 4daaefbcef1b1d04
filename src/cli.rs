//! Command-line argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Answer text spam with canned replies through Messages
#[derive(Debug, Parser)]
#[command(name = "spam-reply")]
#[command(author, version, about = "Answer text spam with canned replies through Messages")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Template file to use instead of the configured one
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Open the terminal UI (default)
    Tui {
        /// Pre-fill the recipient
        #[arg(long)]
        to: Option<String>,

        /// Detect the recipient from the frontmost Messages conversation and
        /// preselect `behavior.quick_preselect` (default: the first duck reply)
        #[arg(long)]
        quick: bool,
    },

    /// List templates
    List,

    /// Show one template
    Show {
        /// Template index (0-based)
        index: usize,
    },

    /// Add a template at the end of the list
    Add {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        message: String,
    },

    /// Edit a template; omitted fields keep their value
    Edit {
        /// Template index (0-based)
        index: usize,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        message: Option<String>,
    },

    /// Delete a template
    Delete {
        /// Template index (0-based)
        index: usize,
    },

    /// Send a template or a literal message
    Send(SendArgs),

    /// Send a random image, falling back to text if it fails
    Image {
        /// Recipient phone number or handle
        #[arg(short, long)]
        to: String,
    },

    /// Check that Messages can be scripted
    Test,

    /// Print the other participant of the frontmost conversation
    Detect,

    /// Replace all templates with the built-in defaults
    Reset,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Recipient phone number or handle
    #[arg(short, long)]
    pub to: String,

    #[command(flatten)]
    pub body: SendBody,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct SendBody {
    /// Template index or name
    #[arg(long)]
    pub template: Option<String>,

    /// Literal message text
    #[arg(short, long)]
    pub message: Option<String>,
}
