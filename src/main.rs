use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doi_harvest::batch::{BatchOptions, BatchRunner};
use doi_harvest::checkpoint::CheckpointStore;
use doi_harvest::config::Config;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// doi-harvest - Bulk DOI-to-PDF downloads via publisher TDM APIs and open-access fallbacks
#[derive(Parser, Debug)]
#[command(name = "doi-harvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resolve DOI lists to full-text PDFs with supplementary material", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv, -vvv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve and download a list of DOIs
    #[command(alias = "r")]
    Run {
        /// DOI to download (repeatable)
        #[arg(long = "doi", value_name = "DOI")]
        dois: Vec<String>,

        /// File with one DOI per line (# comments and blank lines ignored)
        #[arg(long, value_name = "FILE", conflicts_with = "dois", required_unless_present = "dois")]
        doi_file: Option<PathBuf>,

        /// Root directory for article folders and the checkpoint
        /// (default: the configured download directory, downloads/pdfs)
        #[arg(long, short)]
        output_dir: Option<PathBuf>,

        /// Uniform minimum seconds between requests to any one provider
        #[arg(long)]
        delay: Option<f64>,

        /// Stop using a provider after this many successes in this run
        #[arg(long)]
        max_per_publisher: Option<usize>,

        /// Re-download DOIs already checkpointed as successful
        #[arg(long)]
        overwrite: bool,

        /// Skip DOIs whose last checkpointed outcome was a failure
        #[arg(long)]
        skip_failed: bool,

        /// Report the routing plan without downloading anything
        #[arg(long, short = 'n')]
        dry_run: bool,

        /// Process the input in windows of this many DOIs
        #[arg(long)]
        batch_size: Option<usize>,

        /// Zero-based window index (used with --batch-size)
        #[arg(long, default_value_t = 0, requires = "batch_size")]
        batch_index: usize,
    },

    /// Summarize an existing checkpoint without downloading
    Report {
        /// Root directory holding the checkpoint
        #[arg(long, short, default_value = "downloads/pdfs")]
        output_dir: PathBuf,

        /// Checkpoint stem (matches the input file stem of the original run)
        #[arg(long, default_value = "dois")]
        input_stem: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = if cli.quiet { "error" } else { log_level };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("doi_harvest={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Run {
            dois,
            doi_file,
            output_dir,
            delay,
            max_per_publisher,
            overwrite,
            skip_failed,
            dry_run,
            batch_size,
            batch_index,
        } => {
            let (raw_dois, input_stem) = match &doi_file {
                Some(path) => {
                    let content = std::fs::read_to_string(path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    let stem = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "dois".to_string());
                    (content.lines().map(str::to_string).collect::<Vec<_>>(), stem)
                }
                None => (dois, "dois".to_string()),
            };

            let config = Config::default();
            let options = BatchOptions {
                output_dir: output_dir.unwrap_or_else(|| config.downloads.output_dir.clone()),
                input_stem,
                overwrite,
                skip_failed,
                dry_run,
                batch_size,
                batch_index,
                max_per_publisher,
            };

            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&shutdown);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, finishing the current DOI then stopping");
                    flag.store(true, Ordering::SeqCst);
                }
            });

            let mut runner =
                BatchRunner::new(&config, options, delay).with_shutdown_flag(shutdown);
            let summary = runner.run(&raw_dois).await?;

            if !cli.quiet {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            if summary.failures.is_empty() {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }

        Commands::Report {
            output_dir,
            input_stem,
        } => {
            let store = CheckpointStore::for_input(&output_dir, &input_stem)?;
            let summary = store.summary();
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_version() {
        let version = env!("CARGO_PKG_VERSION");
        assert!(!version.is_empty());
        let parts: Vec<&str> = version.split('.').collect();
        assert!(parts.len() >= 2);
        assert!(parts[0].parse::<u32>().is_ok());
    }

    #[test]
    fn test_cli_run_defaults() {
        let cli = Cli::parse_from(["doi-harvest", "run", "--doi", "10.1002/x"]);
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
        match cli.command {
            Commands::Run {
                dois,
                doi_file,
                output_dir,
                overwrite,
                dry_run,
                batch_index,
                ..
            } => {
                assert_eq!(dois, vec!["10.1002/x"]);
                assert!(doi_file.is_none());
                // Falls back to the configured download directory.
                assert!(output_dir.is_none());
                assert!(!overwrite);
                assert!(!dry_run);
                assert_eq!(batch_index, 0);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::parse_from(["doi-harvest", "-vv", "run", "--doi", "10.1002/x"]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_run_with_options() {
        let cli = Cli::parse_from([
            "doi-harvest",
            "run",
            "--doi-file",
            "dois.txt",
            "--delay",
            "3.5",
            "--max-per-publisher",
            "100",
            "--batch-size",
            "500",
            "--batch-index",
            "1",
            "--overwrite",
        ]);
        match cli.command {
            Commands::Run {
                doi_file,
                delay,
                max_per_publisher,
                batch_size,
                batch_index,
                overwrite,
                ..
            } => {
                assert_eq!(doi_file, Some(PathBuf::from("dois.txt")));
                assert_eq!(delay, Some(3.5));
                assert_eq!(max_per_publisher, Some(100));
                assert_eq!(batch_size, Some(500));
                assert_eq!(batch_index, 1);
                assert!(overwrite);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_output_dir_override() {
        let cli = Cli::parse_from([
            "doi-harvest",
            "run",
            "--doi",
            "10.1002/x",
            "--output-dir",
            "papers",
        ]);
        match cli.command {
            Commands::Run { output_dir, .. } => {
                assert_eq!(output_dir, Some(PathBuf::from("papers")));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_rejects_doi_and_file_together() {
        let result = Cli::try_parse_from([
            "doi-harvest",
            "run",
            "--doi",
            "10.1002/x",
            "--doi-file",
            "dois.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_requires_some_input() {
        assert!(Cli::try_parse_from(["doi-harvest", "run"]).is_err());
    }

    #[test]
    fn test_cli_report_command() {
        let cli = Cli::parse_from(["doi-harvest", "report", "--input-stem", "batch1"]);
        match cli.command {
            Commands::Report { input_stem, .. } => assert_eq!(input_stem, "batch1"),
            _ => panic!("Expected Report command"),
        }
    }
}
