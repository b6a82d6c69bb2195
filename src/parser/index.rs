use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::scan::{attr_value, Token};

static BUILD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{6}").unwrap());
static RELEASED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Released ([\d/]*)").unwrap());

/// Class value marking one listing entry (trailing space is literal in the
/// forum markup).
const ROW_CLASS: &str = "cCmsRecord_row ";
/// Icon class flagging a release row as a hotfix.
const WARNING_CLASS: &str = "fa fa-warning";
/// Path substring identifying a row's detail link.
const DETAIL_MARKER: &str = "cRelease";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseType {
    Release,
    Hotfix,
    Test,
}

impl fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReleaseType::Release => "Release",
            ReleaseType::Hotfix => "Hotfix",
            ReleaseType::Test => "Test",
        })
    }
}

/// One listing entry. Fields stay `None` when the row never supplied the
/// signal; completeness is the caller's concern, not the extractor's.
#[derive(Debug, Clone, Default)]
pub struct IndexRecord {
    pub build: Option<u32>,
    pub release_type: Option<ReleaseType>,
    pub release_date: Option<String>,
    pub detail_url: Option<String>,
}

/// Scans index-page tokens into `IndexRecord`s, in scan order (the live
/// index pins the newest release first, so callers sort by build number
/// themselves). One extractor is fed page after page while walking
/// pagination; rows and the continuation link carry across pages.
#[derive(Default)]
pub struct IndexRecordExtractor {
    records: Vec<IndexRecord>,
    current: Option<IndexRecord>,
    in_header: bool,
    hotfix: bool,
    next_page: Option<String>,
}

impl IndexRecordExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_all(&mut self, tokens: &[Token]) {
        for token in tokens {
            self.feed(token);
        }
    }

    pub fn feed(&mut self, token: &Token) {
        match token {
            Token::Start { name, attrs } => self.handle_start(name, attrs),
            Token::End { name } => self.handle_end(name),
            Token::Text(text) => self.handle_text(text),
        }
    }

    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<IndexRecord> {
        self.records
    }

    /// Pagination continuation discovered during the scan, last one wins.
    pub fn next_page(&self) -> Option<&str> {
        self.next_page.as_deref()
    }

    fn handle_start(&mut self, name: &str, attrs: &[(String, String)]) {
        match name {
            "li" if attr_value(attrs, "class") == Some(ROW_CLASS) => {
                // An unterminated previous row is finalized as-is
                if let Some(rec) = self.current.take() {
                    self.records.push(rec);
                }
                self.current = Some(IndexRecord::default());
                self.hotfix = false;
            }
            "h3" => self.in_header = true,
            "i" if attr_value(attrs, "class") == Some(WARNING_CLASS) => self.hotfix = true,
            "a" => {
                let Some(href) = attr_value(attrs, "href") else {
                    return;
                };
                if attrs.iter().any(|(k, v)| k == "rel" && v == "next") {
                    self.next_page = Some(href.to_string());
                } else if href.contains(DETAIL_MARKER) {
                    if let Some(rec) = self.current.as_mut() {
                        rec.detail_url = Some(href.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_end(&mut self, name: &str) {
        match name {
            "li" => {
                if let Some(rec) = self.current.take() {
                    self.records.push(rec);
                    self.hotfix = false;
                }
            }
            "h3" => self.in_header = false,
            _ => {}
        }
    }

    fn handle_text(&mut self, text: &str) {
        let Some(rec) = self.current.as_mut() else {
            return;
        };
        if self.in_header {
            if let Some(m) = BUILD_RE.find(text) {
                rec.build = m.as_str().parse().ok();
            }
            if text == "Test" {
                rec.release_type = Some(ReleaseType::Test);
            } else if text == "Release" {
                rec.release_type = Some(if self.hotfix {
                    ReleaseType::Hotfix
                } else {
                    ReleaseType::Release
                });
            }
            return;
        }
        if let Some(caps) = RELEASED_RE.captures(text) {
            rec.release_date = Some(caps[1].to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::Token;

    fn row(build: &str, kind: &str, date: &str, hotfix: bool) -> Vec<Token> {
        let url = format!("https://forums.example.com/topic/{}-cRelease/", build);
        let mut tokens = vec![Token::start("li", &[("class", "cCmsRecord_row ")])];
        tokens.push(Token::start("h3", &[]));
        if hotfix {
            tokens.push(Token::start("i", &[("class", "fa fa-warning")]));
            tokens.push(Token::end("i"));
        }
        tokens.push(Token::Text(format!("Game Update {}", build)));
        tokens.push(Token::start("span", &[]));
        tokens.push(Token::text(kind));
        tokens.push(Token::end("span"));
        tokens.push(Token::end("h3"));
        tokens.push(Token::start("a", &[("href", &url)]));
        tokens.push(Token::text("notes"));
        tokens.push(Token::end("a"));
        tokens.push(Token::Text(format!("Released {}", date)));
        tokens.push(Token::end("li"));
        tokens
    }

    fn extract(tokens: &[Token]) -> IndexRecordExtractor {
        let mut ex = IndexRecordExtractor::new();
        ex.feed_all(tokens);
        ex
    }

    #[test]
    fn full_row() {
        let ex = extract(&row("581979", "Release", "12/04/2023", false));
        let recs = ex.records();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].build, Some(581979));
        assert_eq!(recs[0].release_type, Some(ReleaseType::Release));
        assert_eq!(recs[0].release_date.as_deref(), Some("12/04/2023"));
        assert!(recs[0].detail_url.as_deref().unwrap().contains("581979"));
    }

    #[test]
    fn warning_icon_turns_release_into_hotfix() {
        let ex = extract(&row("582362", "Release", "12/08/2023", true));
        assert_eq!(ex.records()[0].release_type, Some(ReleaseType::Hotfix));
    }

    #[test]
    fn test_branch_rows() {
        let ex = extract(&row("583190", "Test", "12/14/2023", false));
        assert_eq!(ex.records()[0].release_type, Some(ReleaseType::Test));
    }

    #[test]
    fn hotfix_flag_resets_between_rows() {
        let mut tokens = row("582362", "Release", "12/08/2023", true);
        tokens.extend(row("583000", "Release", "12/20/2023", false));
        let ex = extract(&tokens);
        assert_eq!(ex.records()[1].release_type, Some(ReleaseType::Release));
    }

    #[test]
    fn output_preserves_scan_order_not_build_order() {
        // Newest build pinned first, as on the live index
        let mut tokens = row("590000", "Release", "03/01/2024", false);
        tokens.extend(row("581979", "Release", "12/04/2023", false));
        tokens.extend(row("584000", "Release", "01/10/2024", false));
        let builds: Vec<_> = extract(&tokens)
            .into_records()
            .into_iter()
            .map(|r| r.build.unwrap())
            .collect();
        assert_eq!(builds, vec![590000, 581979, 584000]);
    }

    #[test]
    fn incomplete_row_kept_with_none_fields() {
        let tokens = vec![
            Token::start("li", &[("class", "cCmsRecord_row ")]),
            Token::text("no header, no date"),
            Token::end("li"),
        ];
        let ex = extract(&tokens);
        let rec = &ex.records()[0];
        assert_eq!(rec.build, None);
        assert_eq!(rec.release_type, None);
        assert_eq!(rec.release_date, None);
        assert_eq!(rec.detail_url, None);
    }

    #[test]
    fn text_outside_rows_ignored() {
        let tokens = vec![
            Token::text("Released 01/01/2020"),
            Token::start("h3", &[]),
            Token::text("123456"),
            Token::end("h3"),
        ];
        assert!(extract(&tokens).records().is_empty());
    }

    #[test]
    fn unmarked_list_items_are_not_rows() {
        let tokens = vec![
            Token::start("li", &[("class", "ipsMenu_item")]),
            Token::text("Released 01/01/2020"),
            Token::end("li"),
        ];
        assert!(extract(&tokens).records().is_empty());
    }

    #[test]
    fn last_next_link_wins() {
        let tokens = vec![
            Token::start("a", &[("rel", "next"), ("href", "/page/2/")]),
            Token::end("a"),
            Token::start("a", &[("rel", "next"), ("href", "/page/3/")]),
            Token::end("a"),
        ];
        assert_eq!(extract(&tokens).next_page(), Some("/page/3/"));
    }

    #[test]
    fn records_accumulate_across_pages() {
        let mut ex = IndexRecordExtractor::new();
        ex.feed_all(&row("590000", "Release", "03/01/2024", false));
        let page_two = {
            let mut t = row("584000", "Release", "01/10/2024", false);
            t.push(Token::start("a", &[("rel", "next"), ("href", "/page/3/")]));
            t
        };
        ex.feed_all(&page_two);
        assert_eq!(ex.records().len(), 2);
        assert_eq!(ex.next_page(), Some("/page/3/"));
    }
}
