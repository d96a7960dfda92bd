use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use storewatch::api::{self, AppState};
use storewatch::cli::{Cli, Command, DiffArgs, HistoryArgs, ReportArgs, ScanArgs, ServeArgs};
use storewatch::config::Config;
use storewatch::report::{self, table};
use storewatch::scan::Aggregator;
use storewatch::scheduler::{RootScanner, Scheduler, TriggerReason};
use storewatch::store::diff;
use storewatch::store::snapshot::StoredSnapshot;
use storewatch::store::{Store, Timeframe};
use storewatch::util::whole_millis;
use storewatch::{Error, Result};

fn init_logging() {
    // logs go to stderr so --json output on stdout stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let config = match Config::from_args(&cli.global) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Serve(args) => serve(config, &args),
        Command::Scan(args) => scan_once(&config, &args),
        Command::Report(args) => show_report(&config, &args),
        Command::History(args) => show_history(&config, &args),
        Command::Diff(args) => show_diff(&config, &args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn serve(mut config: Config, args: &ServeArgs) -> Result<()> {
    config.apply_serve(args);
    config.validate()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let store = Arc::new(Store::open(&config.database)?);
        info!(
            root = %config.root.display(),
            database = %config.database.display(),
            scan_hour = config.scan_hour,
            "storewatch starting"
        );

        let source = RootScanner::new(config.root.clone(), Aggregator::from_config(&config));
        let scheduler = Scheduler::start(Arc::new(source), Arc::clone(&store));
        scheduler.spawn_daily(config.scan_hour);

        if config.scan_on_startup {
            scheduler.trigger(TriggerReason::Startup);
        }

        let listener = TcpListener::bind(&config.listen)
            .await
            .map_err(|e| Error::Config(format!("cannot bind {}: {e}", config.listen)))?;

        api::serve(listener, AppState { store, scheduler }).await
    })
}

fn scan_once(config: &Config, args: &ScanArgs) -> Result<()> {
    let store = Store::open(&config.database)?;
    let outcome = Aggregator::from_config(config).scan_with_stats(&config.root)?;

    // a scan that could not be saved is still worth showing
    if let Err(e) = store.store(&outcome.snapshot) {
        warn!(error = %e, "failed to save snapshot");
    }

    report::print(&outcome.snapshot, args.json, table::render);

    if !args.json {
        println!(
            "\nscan completed in {} ({} files",
            humantime::format_duration(whole_millis(outcome.duration)),
            outcome.files_seen
        );
        if outcome.unreadable_files > 0 || outcome.skipped_dirs > 0 {
            print!(
                ", {} unreadable files, {} skipped directories",
                outcome.unreadable_files, outcome.skipped_dirs
            );
        }
        println!(")");
    }

    Ok(())
}

fn show_report(config: &Config, args: &ReportArgs) -> Result<()> {
    let store = Store::open(&config.database)?;

    if args.list {
        let summaries = store.list()?;
        report::print(&summaries, args.json, |s| table::render_list(s));
        return Ok(());
    }

    let snapshot = match args.id {
        Some(id) => store.get(id)?,
        None => store.get_latest()?,
    };

    match snapshot {
        Some(snapshot) => report::print(&snapshot, args.json, table::render),
        None if args.json => println!("null"),
        None => {
            eprintln!("No snapshots found. Run 'storewatch scan' to create one.");
            process::exit(1);
        }
    }

    Ok(())
}

fn show_history(config: &Config, args: &HistoryArgs) -> Result<()> {
    let timeframe: Timeframe = args.timeframe.parse()?;
    let store = Store::open(&config.database)?;
    let snapshots = store.get_history(timeframe)?;
    report::print(&snapshots, args.json, |s| table::render_history(s));
    Ok(())
}

fn show_diff(config: &Config, args: &DiffArgs) -> Result<()> {
    let store = Store::open(&config.database)?;

    let (from, to) = if let (Some(from_id), Some(to_id)) = (args.from, args.to) {
        (load(&store, from_id)?, load(&store, to_id)?)
    } else {
        let mut recent = store.recent(2)?;
        if recent.len() < 2 {
            eprintln!("Need at least 2 snapshots to compare. Run 'storewatch scan' a few times.");
            process::exit(1);
        }
        let newest = recent.remove(0);
        let previous = recent.remove(0);
        (previous, newest)
    };

    let result = diff::compare_snapshots(&from, &to);
    report::print(&result, args.json, table::render_diff);
    Ok(())
}

fn load(store: &Store, id: i64) -> Result<StoredSnapshot> {
    match store.get(id)? {
        Some(snapshot) => Ok(StoredSnapshot { id, snapshot }),
        None => {
            eprintln!("Snapshot {id} not found");
            process::exit(1);
        }
    }
}
