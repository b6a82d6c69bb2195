use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::feed::Feed;
use crate::parser::index::{IndexRecord, ReleaseType};

static RELNOTES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"((?:oni-so|oni-alpha)/.*)/").unwrap());

/// One assembled wiki document, as persisted to the document store.
pub struct Document {
    pub build: u32,
    pub release_type: Option<ReleaseType>,
    pub release_date: Option<String>,
    pub detail_url: Option<String>,
    pub markup: String,
    pub affected: Vec<String>,
}

/// Sort records ascending by build and keep the newest `n` plus one older
/// anchor record (the anchor only supplies the oldest document's `prev`
/// link). The extractor hands records over in scan order and the live index
/// pins the newest release to the top, so sorting here is mandatory.
pub fn latest_window(mut records: Vec<IndexRecord>, n: usize) -> Vec<IndexRecord> {
    let before = records.len();
    records.retain(|r| r.build.is_some());
    if records.len() < before {
        warn!("dropped {} records with no build number", before - records.len());
    }
    records.sort_by_key(|r| r.build);
    let split = records.len().saturating_sub(n + 1);
    records.split_off(split)
}

/// Render the version-info page for one record: the header template, the
/// transcoded update body, and the footer. Missing record fields become
/// empty template slots.
pub fn render(
    feed: Feed,
    prefix: &str,
    record: &IndexRecord,
    prev_build: Option<u32>,
    next_build: Option<u32>,
    markup: &str,
    affected: &[String],
) -> String {
    if record.release_date.is_none() || record.release_type.is_none() {
        warn!("record {:?} is missing date or type", record.build);
    }
    let expansion = if feed.is_expansion() {
        "\n| expansion = Spaced Out!"
    } else {
        ""
    };
    let content_base = if feed.is_expansion() { "no" } else { "yes" };
    let relnotes = record
        .detail_url
        .as_deref()
        .and_then(|url| RELNOTES_RE.captures(url))
        .map(|caps| caps[1].to_string())
        .unwrap_or_default();
    let date = record.release_date.as_deref().unwrap_or_default();
    let release_type = record
        .release_type
        .map(|t| t.to_string())
        .unwrap_or_default();
    let prev = prev_build
        .map(|b| format!("{}-{}", prefix, b))
        .unwrap_or_default();
    let next = next_build
        .map(|b| format!("{}-{}", prefix, b))
        .unwrap_or_default();
    let affected = affected.join(", ");

    format!(
        "{{{{VersionInfoHeader{expansion}\n\
         | date = {date}\n\
         | contentBase = {content_base}\n\
         | contentSO = yes\n\
         | relnotes = {relnotes}\n\
         | type = {release_type}\n\
         | prev = {prev}\n\
         | next = {next}\n\
         | name = \n\
         | affectedPages = {affected}\n\
         }}}}\n\
         \n\
         == Update Information ==\n\
         {markup}\n\
         {{{{VersionInfoFooter}}}}"
    )
}
