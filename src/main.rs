mod db;
mod document;
mod feed;
mod parser;
mod phrases;
mod scan;
mod scraper;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use tracing::warn;

use document::Document;
use feed::Feed;

#[derive(Parser)]
#[command(
    name = "relnote_scraper",
    about = "Game-update release-note scraper and wiki transcoder"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the update index and list discovered records
    Fetch {
        #[arg(short, long, value_enum, default_value = "base")]
        feed: Feed,
        /// Number of most recent updates to collect
        #[arg(short = 'n', long, default_value_t = 5)]
        latest: usize,
        /// Refetch pages even when cached
        #[arg(long)]
        refresh: bool,
    },
    /// Fetch, transcode, and write one wiki page per update
    Build {
        #[arg(short, long, value_enum, default_value = "base")]
        feed: Feed,
        /// Number of most recent updates to publish
        #[arg(short = 'n', long, default_value_t = 5)]
        latest: usize,
        /// Override the media/page prefix (base feed only)
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long, default_value = "out")]
        out: PathBuf,
        #[arg(long, default_value = "data/phrasemap.json")]
        phrasemap: PathBuf,
        /// Refetch pages even when cached
        #[arg(long)]
        refresh: bool,
    },
    /// Run the phrase tagger over a local text file
    Tag {
        file: PathBuf,
        #[arg(long, default_value = "data/phrasemap.json")]
        phrasemap: PathBuf,
    },
    /// Show cache statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fetch {
            feed,
            latest,
            refresh,
        } => fetch(feed, latest, refresh).await,
        Commands::Build {
            feed,
            latest,
            prefix,
            out,
            phrasemap,
            refresh,
        } => build(feed, latest, prefix, &out, &phrasemap, refresh).await,
        Commands::Tag { file, phrasemap } => tag(&file, &phrasemap),
        Commands::Stats => stats(),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn fetch(feed: Feed, latest: usize, refresh: bool) -> Result<()> {
    let conn = db::connect()?;
    db::init_schema(&conn)?;
    let client = scraper::client()?;
    let records = scraper::collect_records(&client, &conn, feed, latest, refresh).await?;
    if records.is_empty() {
        println!("No records found.");
        return Ok(());
    }

    println!("{:>8} | {:<7} | {:<10} | url", "build", "type", "released");
    println!("{}", "-".repeat(72));
    for r in &records {
        println!(
            "{:>8} | {:<7} | {:<10} | {}",
            r.build.map(|b| b.to_string()).unwrap_or_else(|| "-".into()),
            r.release_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".into()),
            r.release_date.as_deref().unwrap_or("-"),
            r.detail_url.as_deref().unwrap_or("-"),
        );
    }
    println!("\n{} records (scan order)", records.len());
    Ok(())
}

async fn build(
    feed: Feed,
    latest: usize,
    prefix: Option<String>,
    out: &Path,
    phrasemap: &Path,
    refresh: bool,
) -> Result<()> {
    let conn = db::connect()?;
    db::init_schema(&conn)?;
    let map = phrases::load_phrase_map(phrasemap)?;
    let prefix = match feed {
        Feed::So => feed.prefix().to_string(),
        Feed::Base => prefix.unwrap_or_else(|| feed.prefix().to_string()),
    };

    let client = scraper::client()?;
    let records = scraper::collect_records(&client, &conn, feed, latest, refresh).await?;
    let window = document::latest_window(records, latest);
    if window.len() < 2 {
        bail!(
            "need at least two records to chain prev links, got {}",
            window.len()
        );
    }

    println!("Fetching {} articles...", window.len() - 1);
    let articles = scraper::fetch_articles(&client, &conn, &window[1..], refresh).await?;

    // Transcoding and tagging are pure; run them data-parallel
    let processed: Vec<Option<parser::ArticleData>> = articles
        .par_iter()
        .map(|html| {
            html.as_deref()
                .and_then(|h| match parser::process_article(h, &prefix, &map) {
                    Ok(data) => Some(data),
                    Err(e) => {
                        warn!("article processing failed: {}", e);
                        None
                    }
                })
        })
        .collect();

    std::fs::create_dir_all(out)
        .with_context(|| format!("creating output dir {}", out.display()))?;
    let mut docs = Vec::new();
    for (i, record) in window.iter().enumerate().skip(1) {
        let Some(build) = record.build else { continue };
        let Some(data) = &processed[i - 1] else {
            warn!("no article data for build {}, skipping", build);
            continue;
        };
        if data.version != build.to_string() {
            warn!(
                "article claims version {} but the index lists build {}",
                data.version, build
            );
        }
        let next = window.get(i + 1).and_then(|r| r.build);
        let text = document::render(
            feed,
            &prefix,
            record,
            window[i - 1].build,
            next,
            &data.markup,
            &data.affected,
        );
        let path = out.join(format!("{}.txt", build));
        std::fs::write(&path, &text)
            .with_context(|| format!("writing {}", path.display()))?;
        docs.push(Document {
            build,
            release_type: record.release_type,
            release_date: record.release_date.clone(),
            detail_url: record.detail_url.clone(),
            markup: data.markup.clone(),
            affected: data.affected.clone(),
        });
    }
    db::save_documents(&conn, &docs)?;
    println!("Wrote {} documents to {}", docs.len(), out.display());
    Ok(())
}

fn tag(file: &Path, phrasemap: &Path) -> Result<()> {
    let map = phrases::load_phrase_map(phrasemap)?;
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let tags = phrases::tag_text(&text, &map);
    if tags.is_empty() {
        println!("No matches.");
    } else {
        println!("{}", tags.join(", "));
    }
    Ok(())
}

fn stats() -> Result<()> {
    let conn = db::connect()?;
    db::init_schema(&conn)?;
    let s = db::get_stats(&conn)?;
    println!("Index pages:   {}", s.index_pages);
    println!("Article pages: {}", s.article_pages);
    println!("Documents:     {}", s.documents);
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
