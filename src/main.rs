//! vaultrun - Main entry point
//!
//! Thin dispatch over the library: load configuration, build the engine and
//! notifier, hand control to the run coordinator, and turn its outcome into
//! an exit code.

use log::{debug, error, info};

use vaultrun::cli::{Cli, Commands};
use vaultrun::config::Settings;
use vaultrun::coordinator::RunCoordinator;
use vaultrun::engine::ResticEngine;
use vaultrun::error::VaultrunError;
use vaultrun::notify::{MailNotifier, Notify};
use vaultrun::process_guard;

/// Initialize the logger with appropriate settings
fn init_logger(verbose: bool) {
    use env_logger::Builder;
    use std::io::Write;

    // Informational logging is opt-in via --verbose; warnings and errors
    // always surface
    let default_level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };

    Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}:{}] {}",
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(default_level)
        .parse_default_env() // RUST_LOG still overrides
        .init();
}

/// Best-effort failure notification for aborts that happen before the
/// coordinator takes over.
fn notify_abort(notifier: &MailNotifier, fatal: &VaultrunError) {
    let body = format!("Backup run aborted: {}", fatal);
    if let Err(e) = notifier.send("vaultrun: backup FAILED", &body) {
        log::warn!("Failed to send failure notification: {}", e);
    }
}

fn main() {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);
    info!("vaultrun starting up");

    // Signal handlers terminate outstanding hook/engine subprocesses if the
    // run itself is interrupted
    if let Err(e) = process_guard::init_signal_handlers() {
        log::warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    // An unreadable configuration file is fatal before anything runs; no
    // mail address is known yet, so this path can only print
    let settings = match Settings::load_from_file(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("✗ {:#}", e);
            std::process::exit(1);
        }
    };
    debug!("Configuration loaded from {:?}", cli.config);

    // The mail address is known from here on, so later fatal paths still
    // attempt the failure notification
    let notifier = MailNotifier::new(settings.mail_to.clone());

    if let Err(e) = settings.validate() {
        let e = VaultrunError::config(format!("{:#}", e));
        error!("{}", e);
        eprintln!("✗ {}", e);
        notify_abort(&notifier, &e);
        std::process::exit(1);
    }

    let engine = ResticEngine::new(&settings);
    if let Err(e) = engine.preflight() {
        error!("{}", e);
        eprintln!("✗ {}", e);
        notify_abort(&notifier, &e);
        std::process::exit(1);
    }

    let coordinator = RunCoordinator::new(&settings, &engine, &notifier, cli.dry_run);
    if cli.dry_run {
        info!("Dry-run mode: mutating engine operations will be skipped");
    }

    match cli.command {
        Commands::Backup { script } => match coordinator.run_backup(script.as_deref()) {
            Ok(summary) => {
                if summary.succeeded() {
                    println!(
                        "✓ Backup run complete ({} script(s), {})",
                        summary.scripts_run,
                        vaultrun::report::format_duration(summary.elapsed)
                    );
                } else {
                    eprintln!(
                        "✗ Backup run finished with {} error(s)",
                        summary.errors.len()
                    );
                    std::process::exit(1);
                }
            }
            Err(e) => {
                error!("Backup run aborted: {}", e);
                eprintln!("✗ {}", e);
                std::process::exit(1);
            }
        },
        Commands::Init { repo } => match coordinator.run_init(repo.as_deref()) {
            Ok(()) => println!("✓ Repository initialization complete"),
            Err(e) => {
                error!("{}", e);
                eprintln!("✗ {}", e);
                std::process::exit(1);
            }
        },
        Commands::Report { repo } => match coordinator.run_report(repo.as_deref()) {
            Ok(report) => println!("{}", report),
            Err(e) => {
                error!("{}", e);
                eprintln!("✗ {}", e);
                std::process::exit(1);
            }
        },
    }
}
