mod archive;
mod args;
mod context;
mod encoding;
mod error;
mod modifier;
mod renamer;
mod report;
mod rules;
mod walker;
mod workspace;

use anyhow::{Result, Context};
use archive::{ArchiveAdapter, ExternalArchiver};
use context::RunContext;
use error::FilterError;
use rules::RuleSet;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use workspace::Workspace;

/// Exit status after Ctrl-C
const EXIT_INTERRUPTED: i32 = 130;

/// Main entry point of the application
/// Handles argument parsing and executes the program with error handling
fn main() -> Result<()> {
    // Parse command line arguments
    let args = args::parse().context("Failed to parse arguments")?;
    init_logging(args.verbose);

    // Execute the program
    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        let code = match e.downcast_ref::<FilterError>() {
            Some(FilterError::Interrupted) => EXIT_INTERRUPTED,
            _ => 1,
        };
        process::exit(code);
    }

    Ok(())
}

/// Configure env_logger; `RUST_LOG` wins over `-v`
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Runs the passes selected on the command line
///
/// # Arguments
/// * `args` - Parsed command line arguments
fn run(args: args::Args) -> Result<()> {
    // Everything that can abort the run is checked before any copying
    let rules = RuleSet::load(&args.filter)?;
    log::info!("Loaded {} rules from {}", rules.len(), args.filter.display());
    workspace::validate_inputs(&args.inputs)?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst))
            .context("Failed to install interrupt handler")?;
    }

    let archiver = if args.no_archiver {
        None
    } else {
        let found = ExternalArchiver::discover(
            args.archiver.as_deref(),
            args.archiver_timeout(),
            cancel.clone(),
        );
        if found.is_none() {
            log::warn!(
                "Could not find an external archiver ({}), only zip, 7z, tar and gzip archives will be processed",
                args.archiver
                    .as_ref()
                    .map(|program| program.display().to_string())
                    .unwrap_or_else(|| archive::EXTERNAL_CANDIDATES.join(", "))
            );
        }
        found
    };

    // Dropping the workspace removes the scratch tree on every exit path
    let workspace = Workspace::create()?;
    workspace.import(&args.inputs)?;

    let ctx = RunContext::new(
        rules,
        ArchiveAdapter::new(workspace.work(), archiver),
        cancel,
    );

    for pass in args.mode.passes() {
        report::banner(pass.title());
        walker::run_pass(&ctx, workspace.tree(), *pass)?;
    }

    // Never publish a tree from an interrupted run
    ctx.check_cancelled()?;
    let destination = workspace.promote(&args.output)?;
    log::info!("Result written to {}", destination.display());

    Ok(())
}
