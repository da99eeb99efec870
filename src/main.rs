// ABOUTME: Main entry point for the stepdeck program.
// ABOUTME: Provides a CLI for exporting decks and rendering thumbnails from a data directory.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use stepdeck::{
    utils, Config, DeckService, DeckThumbnail, HttpFetcher, JsonRepository, LocalAssetStore,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a deck as a standalone HTML file
    Export(ExportArgs),

    /// Render and store a deck's thumbnail, printing its URL
    Thumbnail(DeckArgs),

    /// Write a deck's thumbnail, or the SVG placeholder when none is stored
    Placeholder(ExportArgs),

    /// Print the public preview of a deck as JSON
    Preview(DeckArgs),
}

#[derive(Args)]
struct DeckArgs {
    /// Directory holding deck and step documents
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Deck id
    #[arg(short, long)]
    deck: String,
}

#[derive(Args)]
struct ExportArgs {
    #[command(flatten)]
    target: DeckArgs,

    /// Output file (defaults to a name derived from the deck)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn service_for(args: &DeckArgs) -> anyhow::Result<DeckService> {
    let mut config = Config::from_env();
    if let Some(dir) = &args.data_dir {
        config = Config {
            asset_dir: dir.join("assets"),
            data_dir: dir.clone(),
            ..config
        };
    }

    config.validate()?;

    let repo = Arc::new(JsonRepository::new(&config.data_dir));
    let store = Arc::new(
        LocalAssetStore::new(
            &config.asset_dir,
            &config.asset_base_url,
            &config.signing_secret,
        )
            .context("Invalid asset store configuration")?,
    );
    Ok(DeckService::from_config(
        &config,
        repo,
        store,
        Arc::new(HttpFetcher::new()),
    ))
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Export(args) => {
            let service = service_for(&args.target)?;
            let exported = service
                .export(&args.target.deck)
                .await
                .with_context(|| format!("Failed to export deck {}", args.target.deck))?;
            let output = args
                .output
                .unwrap_or_else(|| PathBuf::from(&exported.filename));
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                utils::ensure_directory_exists(parent)?;
            }
            fs::write(&output, &exported.html)
                .with_context(|| format!("Failed to write output file {:?}", output))?;
            println!("Exported deck to {:?}", output);
        }
        Commands::Thumbnail(args) => {
            let service = service_for(&args)?;
            match service.thumbnails().generate(&args.deck).await? {
                Some(url) => println!("{}", url),
                None => {
                    service.thumbnails().clear(&args.deck).await?;
                    println!("Deck {} has no steps to render", args.deck);
                }
            }
        }
        Commands::Placeholder(args) => {
            let service = service_for(&args.target)?;
            let thumbnail = service.thumbnail(&args.target.deck).await?;
            let (bytes, extension) = match thumbnail {
                DeckThumbnail::Raster { bytes, .. } => (bytes, "jpg"),
                DeckThumbnail::Placeholder(svg) => (svg.into_bytes(), "svg"),
            };
            let output = args
                .output
                .unwrap_or_else(|| PathBuf::from(format!("{}.{}", args.target.deck, extension)));
            fs::write(&output, bytes)
                .with_context(|| format!("Failed to write output file {:?}", output))?;
            println!("Wrote thumbnail to {:?}", output);
        }
        Commands::Preview(args) => {
            let service = service_for(&args)?;
            let preview = service.preview(&args.deck).await?;
            println!("{}", serde_json::to_string_pretty(&preview)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("No command specified. Use --help for usage information.");
        return;
    };

    if let Err(e) = run(command).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
