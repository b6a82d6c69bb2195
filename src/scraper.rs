use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, Url};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db::{self, PageKind};
use crate::feed::Feed;
use crate::parser::index::{IndexRecord, IndexRecordExtractor};
use crate::scan;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
/// Hard cap on the pagination walk; the forum index is a few dozen pages.
const MAX_INDEX_PAGES: usize = 50;

pub fn client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("relnote_scraper/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()
        .context("building http client")
}

/// Fetch a page through the cache. A cache hit skips the network entirely
/// unless `refresh` forces a refetch.
pub async fn fetch_page(
    client: &Client,
    conn: &Connection,
    url: &str,
    kind: PageKind,
    refresh: bool,
) -> Result<String> {
    if !refresh {
        if let Some(html) = db::cached_page(conn, url)? {
            return Ok(html);
        }
    }
    let html = fetch_with_retry(client, url).await?;
    db::cache_page(conn, url, kind, &html)?;
    Ok(html)
}

async fn fetch_with_retry(client: &Client, url: &str) -> Result<String> {
    let mut attempt = 0;
    loop {
        match fetch_once(client, url).await {
            Ok(body) => return Ok(body),
            Err(e) if attempt < MAX_RETRIES && is_transient(&e) => {
                let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                warn!(
                    "fetch failed for {} (attempt {}/{}), backing off {:.1}s: {}",
                    url,
                    attempt + 1,
                    MAX_RETRIES,
                    backoff.as_secs_f64(),
                    e
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn fetch_once(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("requesting {}", url))?;
    let status = response.status();
    if !status.is_success() {
        bail!("HTTP {} for {}", status.as_u16(), url);
    }
    response
        .text()
        .await
        .with_context(|| format!("reading body of {}", url))
}

fn is_transient(e: &anyhow::Error) -> bool {
    if let Some(re) = e.downcast_ref::<reqwest::Error>() {
        if re.is_timeout() || re.is_connect() {
            return true;
        }
    }
    let msg = e.to_string();
    msg.contains("429") || msg.contains("500") || msg.contains("502") || msg.contains("503")
}

/// Walk the paginated index, feeding every page into one extractor, until
/// `n + 1` records are collected (the extra is the prev anchor for the
/// oldest document) or pagination runs out.
pub async fn collect_records(
    client: &Client,
    conn: &Connection,
    feed: Feed,
    n: usize,
    refresh: bool,
) -> Result<Vec<IndexRecord>> {
    let mut extractor = IndexRecordExtractor::new();
    let mut url = feed.index_url().to_string();
    let mut pages = 0;

    loop {
        info!("fetching index page: {}", url);
        let html = fetch_page(client, conn, &url, PageKind::Index, refresh).await?;
        let tokens = scan::scan(&html)
            .with_context(|| format!("tokenizing index page {}", url))?;
        extractor.feed_all(&tokens);
        pages += 1;

        if extractor.records().len() > n || pages >= MAX_INDEX_PAGES {
            break;
        }
        let Some(next) = extractor.next_page() else {
            break;
        };
        let resolved = Url::parse(&url)
            .and_then(|base| base.join(next))
            .with_context(|| format!("resolving continuation link {:?}", next))?
            .to_string();
        // The continuation link persists across pages; the last page of the
        // index points back at itself through the stale link
        if resolved == url {
            break;
        }
        url = resolved;
    }

    info!(
        "collected {} records from {} index pages",
        extractor.records().len(),
        pages
    );
    Ok(extractor.into_records())
}

/// Fetch the detail page for each record. Records without a detail URL or
/// whose fetch ultimately fails yield `None`, keeping positions aligned
/// with the input.
pub async fn fetch_articles(
    client: &Client,
    conn: &Connection,
    records: &[IndexRecord],
    refresh: bool,
) -> Result<Vec<Option<String>>> {
    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut pages = Vec::with_capacity(records.len());
    for record in records {
        let html = match record.detail_url.as_deref() {
            Some(url) => match fetch_page(client, conn, url, PageKind::Article, refresh).await {
                Ok(html) => Some(html),
                Err(e) => {
                    warn!("skipping article for build {:?}: {}", record.build, e);
                    None
                }
            },
            None => {
                warn!("record for build {:?} has no detail url", record.build);
                None
            }
        };
        pages.push(html);
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(pages)
}
