//! distribute - push a directory to every node in the cluster
//!
//! distribute <source_dir> <dest_dir> [user] [max_workers]
//!
//! Exit status is 1 for usage errors and for a failed node inventory, 0
//! otherwise; per-file failures are reported, not fatal.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use fanout::config::LogFormat;
use fanout::discovery::{discover_targets, LocalIdentity};
use fanout::exec::Executor;
use fanout::log::JsonlLog;
use fanout::logger::TextLogger;
use fanout::observer::{ObserverSet, SyncObserver};
use fanout::progress::ConsoleProgress;
use fanout::transport::{SshSettings, SshTransport};
use fanout::{Args, Distributor, SyncConfig};

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn load_config(args: &Args) -> Result<SyncConfig> {
    let mut config = match &args.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn build_observer(args: &Args, config: &SyncConfig) -> Arc<dyn SyncObserver> {
    let mut observers = ObserverSet::new();

    if !args.quiet && !args.json {
        observers.push(Arc::new(ConsoleProgress::new(args.verbose)));
    }

    // A log that cannot be opened is reported but does not stop the run
    if let Some(path) = &config.log_file {
        let sink: Result<Arc<dyn SyncObserver>> = match config.log_format {
            LogFormat::Text => TextLogger::new(path).map(|l| Arc::new(l) as Arc<dyn SyncObserver>),
            LogFormat::Jsonl => JsonlLog::new(path).map(|l| Arc::new(l) as Arc<dyn SyncObserver>),
        };
        match sink {
            Ok(sink) => observers.push(sink),
            Err(e) => eprintln!("warning: cannot open log file {}: {:#}", path.display(), e),
        }
    }

    Arc::new(observers)
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let exec = Arc::new(Executor::new().context("Failed to start process runtime")?);
    let observer = build_observer(&args, &config);

    let (identity, warnings) = LocalIdentity::detect(
        &exec,
        &config.local_address_command,
        &config.local_addresses,
        config.command_timeout(),
    );
    for w in &warnings {
        observer.warning(w);
    }

    let addresses = if config.hosts.is_empty() {
        discover_targets(&exec, &config.inventory_command, config.command_timeout())
            .context("Node discovery failed")?
    } else {
        config.hosts.clone()
    };

    let transport = Arc::new(SshTransport::new(exec.clone(), SshSettings::from_config(&config)));
    let distributor = Distributor::new(Arc::new(config), transport, observer);

    // First Ctrl-C: finish current files and report. Second: exit at once.
    let cancel = distributor.cancel_flag();
    ctrlc::set_handler(move || {
        if cancel.swap(true, Ordering::SeqCst) {
            eprintln!("\nInterrupted again. Exiting (Ctrl-C)...");
            std::process::exit(130);
        }
        eprintln!("\nInterrupted. Finishing in-flight files; press Ctrl-C again to exit now.");
    })
    .context("Error setting Ctrl-C handler")?;

    let report = distributor.run(&args.source, &args.destination, addresses, &identity)?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        println!();
        print!("{}", report.render());
    }

    Ok(())
}
