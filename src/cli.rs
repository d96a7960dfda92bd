use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "storewatch")]
#[command(about = "Scheduled directory size scanner with snapshot history")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand, layered over the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Config file (defaults to config.toml in the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory to scan
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// SQLite database holding the snapshots
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Descend into symlinked directories (loops are detected and skipped)
    #[arg(long, global = true, default_value_t = false)]
    pub follow_symlinks: bool,

    /// Maximum traversal depth below the root
    #[arg(long, global = true)]
    pub max_depth: Option<usize>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API with the daily scan schedule
    Serve(ServeArgs),

    /// Scan the root once, store the snapshot and print it
    Scan(ScanArgs),

    /// Display the most recent snapshot or a specific one
    Report(ReportArgs),

    /// List snapshots taken within a timeframe
    History(HistoryArgs),

    /// Compare two snapshots
    Diff(DiffArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to bind the HTTP API to
    #[arg(long)]
    pub listen: Option<String>,

    /// Local hour (0-23) of the daily scan
    #[arg(long)]
    pub scan_hour: Option<u32>,

    /// Run one scan as soon as the server is up
    #[arg(long, default_value_t = false)]
    pub scan_on_startup: bool,
}

#[derive(Args, Debug, Default)]
pub struct ScanArgs {
    /// Output as JSON instead of table
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Default)]
pub struct ReportArgs {
    /// Show a specific snapshot by ID
    #[arg(long)]
    pub id: Option<i64>,

    /// List all stored snapshots
    #[arg(long, default_value_t = false)]
    pub list: bool,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Lookback window: day, week, month or year
    #[arg(long, default_value = "week")]
    pub timeframe: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Default)]
pub struct DiffArgs {
    /// Starting snapshot ID for comparison
    #[arg(long, requires = "to")]
    pub from: Option<i64>,

    /// Ending snapshot ID for comparison
    #[arg(long, requires = "from")]
    pub to: Option<i64>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
