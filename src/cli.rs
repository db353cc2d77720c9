// ABOUTME: Command-line interface definitions using clap
// ABOUTME: Defines export/import/sync subcommands and global flags

use crate::model::ItemStatus;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "marksync")]
#[command(about = "Export and import content items as Markdown archives with remote sync", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Content store file
    #[arg(long, global = true, default_value = "content.json")]
    pub store: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Export matching items into a Markdown ZIP archive
    Export {
        /// Filter by status (published, draft, pending, scheduled)
        #[arg(long, value_parser = parse_status)]
        status: Option<ItemStatus>,

        /// Filter by author reference
        #[arg(long)]
        author: Option<String>,

        /// Inclusive start of the date range (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,

        /// Inclusive end of the date range (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,

        /// Include items already marked as exported
        #[arg(long)]
        include_exported: bool,

        /// Write the archive here instead of the generated name
        #[arg(long)]
        output: Option<PathBuf>,

        /// Also push the exported documents to enabled sync targets
        #[arg(long)]
        sync: bool,
    },

    /// Import a ZIP archive or a single Markdown document
    Import {
        /// Local file to import
        file: Option<PathBuf>,

        /// Fetch the payload from the GitHub target at this path
        #[arg(long, conflicts_with = "file")]
        from_github: Option<String>,

        /// Fetch the payload from the Drive target by object id
        #[arg(long, conflicts_with_all = ["file", "from_github"])]
        from_drive: Option<String>,

        /// Push the imported payload to enabled sync targets afterwards
        #[arg(long)]
        sync: bool,
    },

    /// Scheduled run: export never-exported items and push to configured targets
    Sync,
}

fn parse_status(value: &str) -> Result<ItemStatus, String> {
    ItemStatus::parse(value)
        .ok_or_else(|| "expected published, draft, pending, or scheduled".to_string())
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| "expected YYYY-MM-DD".to_string())
}
