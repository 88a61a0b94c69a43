use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use shelf::config::{config_path_from_env, load_or_create_config};
use shelf::Shelf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "shelf")]
#[command(about = "Audio collection index, search and size normalization", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file; defaults to $SHELF_CONFIG or config.yaml beside the binary
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the collection index
    Scan,
    /// Find tracks by a loose text query
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Pick random tracks, multi-part recordings excluded
    Random {
        #[arg(default_value_t = 1)]
        n: usize,
    },
    /// Merge oversized multi-part recordings and split large files
    Normalize,
    /// Most rated tracks
    Top {
        /// Defaults to the configured top_limit
        n: Option<usize>,
    },
    /// Tracks rated by a user
    Likes { user: String },
    /// Rate the track with the given identifier
    Rate { user: String, hash: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = cli.config.unwrap_or_else(config_path_from_env);
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }
    let shelf = Shelf::open(&config_path, config).await?;

    match cli.command {
        Commands::Scan => {
            // opening the shelf already built a fresh index
            println!("{} tracks indexed", shelf.collection().snapshot().len());
        }
        Commands::Search { query } => {
            for caption in shelf.search(&query.join(" ")) {
                print_track(&shelf, &caption);
            }
        }
        Commands::Random { n } => {
            for caption in shelf.random_many(n) {
                print_track(&shelf, &caption);
            }
        }
        Commands::Normalize => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for ctrl-c: {}", err);
                    return;
                }
                info!("Stopping after the current file...");
                on_signal.cancel();
            });

            let report = shelf.normalizer().run(&cancel).await?;
            println!(
                "merged {} groups, split {} files, {} failures{}",
                report.merged.len(),
                report.split.len(),
                report.failures.len(),
                if report.cancelled { " (cancelled)" } else { "" }
            );
            for failure in &report.failures {
                println!("  {}: {}", failure.unit, failure.error);
            }
            if !report.failures.is_empty() {
                return Err("some files were not normalized".into());
            }
        }
        Commands::Top { n } => {
            let limit = n.unwrap_or(shelf.config().top_limit);
            for caption in shelf.top_n(limit)? {
                let votes = shelf.votes(&caption)?;
                println!("{:>4}  {}", votes, caption);
            }
        }
        Commands::Likes { user } => {
            for caption in shelf.liked(&user)? {
                print_track(&shelf, &caption);
            }
        }
        Commands::Rate { user, hash } => {
            let caption = shelf.rate_by_hash(&user, &hash)?;
            println!("rated {}", caption);
        }
    }
    Ok(())
}

fn print_track(shelf: &Shelf, caption: &str) {
    match shelf.track(caption) {
        Some(track) => println!("{}  {}  {}s", track.hash, track.caption, track.length),
        None => println!("{}", caption),
    }
}
