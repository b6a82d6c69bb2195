pub mod article;
pub mod index;

use anyhow::Result;

use crate::phrases::{self, PhraseMap};
use crate::scan;

pub use article::ArticleTranscoder;
pub use index::{IndexRecord, IndexRecordExtractor, ReleaseType};

pub struct ArticleData {
    /// Build number the article itself claims in its title text.
    pub version: String,
    pub markup: String,
    pub affected: Vec<String>,
}

/// Full article pipeline: html → tokens → wiki markup → affected tags.
pub fn process_article(html: &str, prefix: &str, map: &PhraseMap) -> Result<ArticleData> {
    let tokens = scan::scan(html)?;
    let mut transcoder = ArticleTranscoder::new(prefix);
    for token in &tokens {
        transcoder.feed(token);
    }
    let version = transcoder.version().to_string();
    let markup = transcoder.finish();
    let affected = phrases::tag_text(&markup, map);
    Ok(ArticleData {
        version,
        markup,
        affected,
    })
}
