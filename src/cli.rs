use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "commentlens")]
#[command(about = "Deduplication-aware analysis pipeline for public regulation comments")]
#[command(version)]
pub struct Cli {
    /// Create default configuration file at ./config/commentlens.toml
    #[arg(long)]
    pub init: bool,

    /// Path to the comments CSV file
    #[arg(long, default_value = "comments.csv")]
    pub csv: PathBuf,

    /// Output filename stem (extension is set by the format)
    #[arg(short, long, default_value = "analyzed_comments")]
    pub output: String,

    /// Output format: 'json' (default) or 'csv'
    #[arg(short = 'f', long, default_value = "json")]
    pub output_format: String,

    /// Process only N randomly sampled submissions (reproducible seed)
    #[arg(long)]
    pub sample: Option<usize>,

    /// Read at most N rows from the CSV
    #[arg(long)]
    pub limit: Option<usize>,

    /// Classifier model to use (overrides config)
    #[arg(long)]
    pub model: Option<String>,

    /// Truncate submission text to N characters before classification
    #[arg(long)]
    pub truncate: Option<usize>,

    /// Concurrent classifier calls within a batch (overrides config)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Representatives per batch (overrides config)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Disable parallel classification (use sequential)
    #[arg(long)]
    pub no_parallel: bool,

    /// Enable the vision service fallback for attachment extraction
    /// (requires COMMENTLENS_VISION_API_KEY)
    #[arg(long)]
    pub use_vision: bool,

    /// Verbose logging (use -v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
