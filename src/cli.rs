use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "mailtext",
    version,
    about = "Watch a mailbox for PDF/image attachments and extract their text, once each"
)]
pub struct Cli {
    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll the mailbox until interrupted
    Watch {
        /// Seconds between polls (overrides [watch] poll_interval)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run a single poll cycle and exit
    Sync,

    /// Extract text from a local PDF or image and print it
    Extract {
        /// File to extract (.pdf, .jpg, .jpeg, .png)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Show ledger and attachment store summary
    Status,
}
