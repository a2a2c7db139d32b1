pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Relay for end-to-end encrypted messaging")]
pub struct Args {
    /// Relay API to talk to (defaults to localhost on the configured port)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Bearer token for authenticated API calls
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Path to the courier config directory (defaults to ~/.courier)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
