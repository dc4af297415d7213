//! tfcov - Measure acceptance test coverage of Terraform provider resources
//!
//! tfcov discovers the resources, data sources and actions a provider
//! declares, links each acceptance test to the entity it exercises, and
//! reports entities whose tests miss basic, update, import, error or
//! destroy coverage.

use eyre::{Result, WrapErr};
use figue as args;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use tfcov::{Analysis, OutputFormat, RenderOptions, load_settings, render};
use tfcov_core::RegistryCache;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// CLI arguments
#[derive(Debug, facet::Facet)]
struct Args {
    /// Provider source directory to analyse (default: current directory)
    #[facet(args::positional)]
    path: Vec<PathBuf>,

    /// Path to settings file (default: <path>/.tfcov.yaml)
    #[facet(args::named, args::short = 'c', default)]
    config: Option<PathBuf>,

    /// Output format: text, json
    #[facet(args::named, args::short = 'f', default)]
    format: Option<String>,

    /// Show every entity and its tests, and log debug events
    #[facet(args::named, args::short = 'v', default)]
    verbose: bool,

    /// Exit 1 if any finding has error severity
    #[facet(args::named, default)]
    check: bool,

    /// List test functions not linked to any entity
    #[facet(args::named, default)]
    show_unmatched: bool,
}

fn main() -> Result<()> {
    let args: Args =
        figue::from_std_args()
            .into_result()
            .map(|output| output.get())
            .wrap_err("Failed to parse command line arguments")?;

    init_logging(args.verbose);

    let root = match args.path.as_slice() {
        [] => PathBuf::from("."),
        [path] => path.clone(),
        _ => eyre::bail!("Expected at most one path. Usage: tfcov [PATH]"),
    };
    if !root.is_dir() {
        eyre::bail!("{} is not a directory", root.display());
    }
    let format = match args.format.as_deref() {
        None => OutputFormat::default(),
        Some(f) => OutputFormat::from_str(f)
            .ok_or_else(|| eyre::eyre!("Unknown output format '{}' (expected text or json)", f))?,
    };

    let settings = load_settings(&root, args.config.as_deref())?;
    let cache = RegistryCache::from_settings(&settings)?;

    if format == OutputFormat::Text {
        eprintln!(
            "{} Analysing {}...",
            "->".blue().bold(),
            root.display()
        );
    }
    let analysis = Analysis::run(&root, &settings, &cache)?;

    let options = RenderOptions {
        verbose: args.verbose || settings.verbose,
        show_unmatched: args.show_unmatched || settings.show_unmatched_tests,
        show_confidence: settings.show_match_confidence,
    };
    print!("{}", render(&analysis, format, options));

    if args.check && analysis.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`, or `debug` with `--verbose`)
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
