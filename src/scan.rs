use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// One markup token in document order. Tag names are lowercased; attributes
/// keep their source order. Void and self-closing elements produce a `Start`
/// with no matching `End`.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Text(String),
}

/// Hand-built tokens for state-machine tests.
#[cfg(test)]
impl Token {
    pub fn start(name: &str, attrs: &[(&str, &str)]) -> Self {
        Token::Start {
            name: name.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn end(name: &str) -> Self {
        Token::End {
            name: name.to_string(),
        }
    }

    pub fn text(content: &str) -> Self {
        Token::Text(content.to_string())
    }
}

/// Look up an attribute value by (case-insensitive) key.
pub fn attr_value<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Tokenize one HTML page. The reader is configured leniently: end-tag name
/// checking is off, unmatched end tags and dangling ampersands are tolerated,
/// and attributes are parsed in HTML mode (unquoted values, bare flags).
/// Adjacent text and resolved entity references coalesce into a single `Text`
/// token, so downstream state machines see one text run per gap between tags.
pub fn scan(html: &str) -> Result<Vec<Token>> {
    let mut reader = Reader::from_reader(html.as_bytes());
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut tokens = Vec::new();
    let mut pending = String::new();
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .with_context(|| format!("scan failed at byte {}", reader.buffer_position()))?;
        match event {
            Event::Start(e) => {
                flush_text(&mut pending, &mut tokens);
                tokens.push(start_token(&e));
            }
            Event::Empty(e) => {
                flush_text(&mut pending, &mut tokens);
                tokens.push(start_token(&e));
            }
            Event::End(e) => {
                flush_text(&mut pending, &mut tokens);
                tokens.push(Token::End {
                    name: String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase(),
                });
            }
            Event::Text(e) => match e.unescape_with(resolve_entity) {
                Ok(text) => pending.push_str(&text),
                Err(_) => pending.push_str(&String::from_utf8_lossy(e.as_ref())),
            },
            Event::CData(e) => pending.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => {
                flush_text(&mut pending, &mut tokens);
                break;
            }
        }
        buf.clear();
    }

    Ok(tokens)
}

fn flush_text(pending: &mut String, tokens: &mut Vec<Token>) {
    if !pending.is_empty() {
        tokens.push(Token::Text(std::mem::take(pending)));
    }
}

fn start_token(e: &quick_xml::events::BytesStart) -> Token {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
    let mut attrs = Vec::new();
    for attr in e.html_attributes().with_checks(false).flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = match attr.unescape_value_with(|ent| resolve_entity(ent)) {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attrs.push((key, value));
    }
    Token::Start { name, attrs }
}

/// Named entities seen in the forum markup beyond the XML predefined set.
/// Numeric references are handled separately; attribute values get numerics
/// resolved by the unescaper itself.
fn resolve_entity(name: &str) -> Option<&'static str> {
    match name {
        "amp" => Some("&"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "quot" => Some("\""),
        "apos" => Some("'"),
        "nbsp" => Some("\u{a0}"),
        "rsquo" => Some("\u{2019}"),
        "lsquo" => Some("\u{2018}"),
        "ldquo" => Some("\u{201c}"),
        "rdquo" => Some("\u{201d}"),
        "ndash" => Some("\u{2013}"),
        "mdash" => Some("\u{2014}"),
        "hellip" => Some("\u{2026}"),
        _ => None,
    }
}
