use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use forum_graph_scraper::config::Config;
use forum_graph_scraper::crawl::run_crawl;
use forum_graph_scraper::sink::JsonlSink;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing();

    info!("Starting forum-graph-scraper");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(forum_url = %config.forum_url, "Configuration loaded");

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .context("Failed to create output directory")?;

    let mut sink = JsonlSink::new(
        output_file(&config, "posts.jsonl")?,
        output_file(&config, "users.jsonl")?,
        output_file(&config, "interactions.jsonl")?,
        output_file(&config, "threads.jsonl")?,
    );

    let stats = run_crawl(&config, &mut sink).await?;

    info!(
        threads = stats.threads_scraped,
        failed = stats.threads_failed,
        posts = stats.posts,
        interactions = stats.interactions,
        users = stats.users,
        "Done"
    );

    Ok(())
}

fn output_file(config: &Config, name: &str) -> Result<BufWriter<File>> {
    let path = config.output_dir.join(name);
    let file =
        File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,forum_graph_scraper=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
