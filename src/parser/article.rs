use std::sync::LazyLock;

use regex::Regex;

use crate::scan::{attr_value, Token};

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Game Update.*(\d{6})").unwrap());
static FONT_SIZE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"font-size:(\d{2})px").unwrap());
static BOLD_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^'''([\w ]+)'''$").unwrap());

/// Text literal that opens the transcoded region of an article page.
const SECTION_OPEN: &str = "Update Information:";
/// Ladder key reserved for bold-only paragraphs promoted to headings.
const BOLD_KEY: &str = "'''";

/// Streaming converter from an article's tag/text token stream to wiki
/// markup. One instance per article; tokens before the section-open marker
/// are only scanned for the build-version signal, never emitted.
///
/// Formatting flags are toggled by matching start/end tags. A start flag
/// with no matching end tag stays set until something clears it; real forum
/// markup drops closing tags often enough that this is tolerated rather
/// than treated as an error.
pub struct ArticleTranscoder {
    prefix: String,
    fragments: Vec<String>,
    buffer: String,
    version: String,
    in_section: bool,
    list_depth: usize,
    heading_ladder: Vec<String>,
    heading_level: usize,
    bold: bool,
    italic: bool,
    heading: bool,
    paragraph: bool,
    link: Option<String>,
    img_count: u32,
    video_count: u32,
}

impl ArticleTranscoder {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            fragments: Vec::new(),
            buffer: String::new(),
            version: "000000".to_string(),
            in_section: false,
            list_depth: 0,
            heading_ladder: Vec::new(),
            heading_level: 0,
            bold: false,
            italic: false,
            heading: false,
            paragraph: false,
            link: None,
            img_count: 0,
            video_count: 0,
        }
    }

    /// Run a whole token stream through a fresh transcoder.
    pub fn transcode(tokens: &[Token], prefix: &str) -> String {
        let mut t = Self::new(prefix);
        for token in tokens {
            t.feed(token);
        }
        t.finish()
    }

    pub fn feed(&mut self, token: &Token) {
        match token {
            Token::Start { name, attrs } => self.handle_start(name, attrs),
            Token::End { name } => self.handle_end(name),
            Token::Text(text) => self.handle_text(text),
        }
    }

    /// Six-digit build number captured from the pre-section title text,
    /// `000000` if no signal was seen.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn finish(self) -> String {
        self.fragments.concat()
    }

    fn handle_start(&mut self, name: &str, attrs: &[(String, String)]) {
        if !self.in_section {
            return;
        }
        match name {
            "p" => self.paragraph = true,
            // Attributed lists are navigation chrome, not content
            "ul" if attrs.is_empty() => self.list_depth += 1,
            "li" if self.list_depth > 0 => {
                let bullet = format!("\n{} ", "*".repeat(self.list_depth));
                self.buffer.push_str(&bullet);
            }
            "strong" | "b" => self.bold = true,
            "em" => self.italic = true,
            "span" if !attrs.is_empty() => {
                if let Some(caps) = attr_value(attrs, "style").and_then(|s| FONT_SIZE_RE.captures(s))
                {
                    self.ladder_level(&caps[1]);
                    self.heading = true;
                }
            }
            "a" => self.link = attr_value(attrs, "href").map(str::to_string),
            "img" => {
                self.img_count += 1;
                self.push_media("png", self.img_count);
            }
            "video" => {
                self.video_count += 1;
                self.push_media("mp4", self.video_count);
            }
            _ => {}
        }
    }

    fn handle_end(&mut self, name: &str) {
        if !self.in_section {
            return;
        }
        match name {
            "section" => self.in_section = false,
            "p" => {
                self.flush();
                self.paragraph = false;
            }
            "ul" => {
                // Saturate on stray closers (attributed <ul> never incremented)
                self.list_depth = self.list_depth.saturating_sub(1);
                self.flush();
                if self.list_depth == 0 {
                    self.fragments.push("\n".to_string());
                }
            }
            "strong" | "b" => self.bold = false,
            "em" => self.italic = false,
            "span" => self.heading = false,
            "a" => self.link = None,
            _ => {}
        }
    }

    fn handle_text(&mut self, text: &str) {
        if !self.in_section {
            if let Some(caps) = VERSION_RE.captures(text) {
                self.version = caps[1].to_string();
            }
            if text == SECTION_OPEN {
                self.in_section = true;
            }
            return;
        }

        let data = text.replace(['\n', '\t'], "").replace('\u{a0}', " ");
        // A lone space is formatting residue; wrapping it would leave
        // empty bold/italic/link pairs in the output
        if data.is_empty() || data == " " {
            return;
        }

        if self.heading {
            let marker = "=".repeat(self.heading_level + 1);
            self.buffer.push_str(&marker);
            self.buffer.push(' ');
            self.buffer.push_str(&data);
            self.buffer.push(' ');
            self.buffer.push_str(&marker);
        } else {
            if self.bold {
                self.buffer.push_str("'''");
            }
            if self.italic {
                self.buffer.push_str("''");
            }
            if let Some(target) = &self.link {
                self.buffer.push('[');
                self.buffer.push_str(target);
                self.buffer.push(' ');
            }
            self.buffer.push_str(&data);
            if self.link.is_some() {
                self.buffer.push(']');
            }
            if self.italic {
                self.buffer.push_str("''");
            }
            if self.bold {
                self.buffer.push_str("'''");
            }
        }
    }

    /// Stable heading level for a size key. The ladder only grows: once a
    /// size has been seen its level is fixed for the rest of the document.
    fn ladder_level(&mut self, key: &str) -> usize {
        let level = match self.heading_ladder.iter().position(|k| k == key) {
            Some(i) => i,
            None => {
                self.heading_ladder.push(key.to_string());
                self.heading_ladder.len() - 1
            }
        };
        self.heading_level = level;
        level
    }

    fn push_media(&mut self, ext: &str, counter: u32) {
        self.fragments.push(format!(
            "\n[[File:{}-{}-{}.{}]]\n",
            self.prefix, self.version, counter, ext
        ));
    }

    /// Emit the buffered text. Adjacent bold/bold or italic/italic toggles
    /// concatenate their delimiters into runs of 4-8 quote characters; the
    /// fixed replacement chain reduces the observed run lengths back to
    /// valid markup (runs of other lengths pass through untouched).
    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        if self.paragraph {
            self.fragments.push("\n".to_string());
        }
        let mut text = std::mem::take(&mut self.buffer)
            .replace("''''''''", "''")
            .replace("'''''''", "'''")
            .replace("''''''", "")
            .replace("''''", "")
            .replace('\u{2019}', "'")
            .replace('\u{2018}', "'")
            .replace('\u{201c}', "\"")
            .replace('\u{201d}', "\"");
        if let Some(heading) = self.implicit_heading(&text) {
            text = heading;
        }
        self.fragments.push(text);
        if self.paragraph {
            self.fragments.push("\n".to_string());
        }
    }

    /// A paragraph that is nothing but one short bold run is an implicit
    /// heading; the bold key gets its own permanent ladder slot.
    fn implicit_heading(&mut self, text: &str) -> Option<String> {
        let caps = BOLD_LINE_RE.captures(text)?;
        let marker = "=".repeat(self.ladder_level(BOLD_KEY) + 1);
        Some(format!("{} {} {}", marker, &caps[1], marker))
    }
}
