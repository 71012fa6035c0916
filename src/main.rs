use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mdkb_search::search::{commands, SearchConfig, SearchManager};

#[derive(Parser)]
#[command(name = "mdkb-search", version, about = "Search a folder of Markdown notes")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for persisted change-detection metadata (overrides the config)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search a folder, building its index if needed
    Search {
        folder: String,
        query: String,
        /// Rebuild the index from scratch before searching
        #[arg(long)]
        force_refresh: bool,
        /// Skip the rescan of an already cached index
        #[arg(long)]
        no_auto_update: bool,
    },
    /// Build the index for a folder and report what changed since the last run
    Build { folder: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => match SearchConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => SearchConfig::default(),
    };
    if let Some(cache_dir) = cli.cache_dir {
        config.cache_dir = cache_dir;
    }
    let manager = SearchManager::new(config);

    let (output, success) = match cli.command {
        Command::Search {
            folder,
            query,
            force_refresh,
            no_auto_update,
        } => {
            let response = commands::search_files(
                &manager,
                &folder,
                &query,
                Some(!no_auto_update),
                Some(force_refresh),
            )
            .await;
            (serde_json::to_string_pretty(&response), response.success)
        }
        Command::Build { folder } => {
            match manager.build_index_for_folder(Path::new(&folder)).await {
                Ok(report) => (serde_json::to_string_pretty(&report), true),
                Err(e) => {
                    eprintln!("Build failed: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    match output {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize output: {}", e);
            return ExitCode::FAILURE;
        }
    }
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
