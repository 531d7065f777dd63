use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "houscan")]
#[command(
    about = "Crawl a Houdini scripting session and persist its modules, classes and functions to SQLite"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Crawl {
        /// Session snapshot exported from a running hython.
        #[arg(long, value_name = "FILE")]
        session: PathBuf,

        /// Houdini installation root; overrides auto-detection.
        #[arg(long, value_name = "DIR")]
        hfs: Option<PathBuf>,

        #[arg(long, value_name = "VER")]
        houdini_version: Option<String>,

        /// Search-path roots to enumerate; replaces the installation's own.
        #[arg(long = "path", value_name = "DIR")]
        paths: Vec<PathBuf>,

        /// Re-crawl these modules even if a previous run stored them.
        #[arg(long, value_name = "NAME")]
        force: Vec<String>,
    },
    Stats,
    Clear,
}
