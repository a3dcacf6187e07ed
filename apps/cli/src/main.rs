mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Builds the bookstore site into a deployable directory", long_about = None)]
struct Cli {
    /// Log every file the pipeline touches
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline
    Build {
        #[arg(long, short)]
        input: Option<PathBuf>,

        #[arg(long, short)]
        output: Option<PathBuf>,

        #[arg(long)]
        base_url: Option<String>,

        #[arg(long)]
        no_sitemap: bool,
    },
    /// Validate the raw catalog without building
    Check {
        #[arg(long, short)]
        input: Option<PathBuf>,
    },
    /// Regenerate sitemap.xml for an existing output directory
    Sitemap {
        #[arg(long, short)]
        input: Option<PathBuf>,

        #[arg(long, short)]
        output: Option<PathBuf>,

        #[arg(long)]
        base_url: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Build {
            input,
            output,
            base_url,
            no_sitemap,
        } => commands::build_site(
            input.as_deref(),
            output.as_deref(),
            base_url.as_deref(),
            !no_sitemap,
        ),
        Commands::Check { input } => commands::check_catalog(input.as_deref()),
        Commands::Sitemap {
            input,
            output,
            base_url,
        } => commands::write_sitemap(input.as_deref(), output.as_deref(), base_url.as_deref()),
    };

    if let Err(error) = result {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}
