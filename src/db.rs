use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::document::Document;

const DB_PATH: &str = "data/relnotes.sqlite";

#[derive(Debug, Clone, Copy)]
pub enum PageKind {
    Index,
    Article,
}

impl PageKind {
    fn as_str(self) -> &'static str {
        match self {
            PageKind::Index => "index",
            PageKind::Article => "article",
        }
    }
}

pub fn connect() -> Result<Connection> {
    if let Some(dir) = std::path::Path::new(DB_PATH).parent() {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pages (
            url        TEXT PRIMARY KEY,
            kind       TEXT NOT NULL CHECK(kind IN ('index','article')),
            html       TEXT NOT NULL,
            fetched_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_pages_kind ON pages(kind);

        CREATE TABLE IF NOT EXISTS documents (
            build        INTEGER PRIMARY KEY,
            release_type TEXT,
            release_date TEXT,
            url          TEXT,
            markup       TEXT NOT NULL,
            affected     TEXT NOT NULL,
            generated_at TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

// ── Page cache ──

pub fn cache_page(conn: &Connection, url: &str, kind: PageKind, html: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO pages (url, kind, html, fetched_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![url, kind.as_str(), html, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn cached_page(conn: &Connection, url: &str) -> Result<Option<String>> {
    let html = conn
        .query_row("SELECT html FROM pages WHERE url = ?1", [url], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(html)
}

// ── Generated documents ──

pub fn save_documents(conn: &Connection, docs: &[Document]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO documents
             (build, release_type, release_date, url, markup, affected, generated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for d in docs {
            stmt.execute(rusqlite::params![
                d.build,
                d.release_type.map(|t| t.to_string()),
                d.release_date,
                d.detail_url,
                d.markup,
                d.affected.join(", "),
                Utc::now().to_rfc3339(),
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Stats ──

pub struct Stats {
    pub index_pages: usize,
    pub article_pages: usize,
    pub documents: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> {
        Ok(conn.query_row(sql, [], |row| row.get::<_, i64>(0))? as usize)
    };
    Ok(Stats {
        index_pages: count("SELECT COUNT(*) FROM pages WHERE kind = 'index'")?,
        article_pages: count("SELECT COUNT(*) FROM pages WHERE kind = 'article'")?,
        documents: count("SELECT COUNT(*) FROM documents")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn page_cache_roundtrip() {
        let conn = test_conn();
        cache_page(&conn, "https://x/1", PageKind::Article, "<html/>").unwrap();
        assert_eq!(
            cached_page(&conn, "https://x/1").unwrap().as_deref(),
            Some("<html/>")
        );
        assert_eq!(cached_page(&conn, "https://x/2").unwrap(), None);
    }

    #[test]
    fn refetch_replaces_cached_html() {
        let conn = test_conn();
        cache_page(&conn, "https://x/1", PageKind::Index, "old").unwrap();
        cache_page(&conn, "https://x/1", PageKind::Index, "new").unwrap();
        assert_eq!(
            cached_page(&conn, "https://x/1").unwrap().as_deref(),
            Some("new")
        );
    }

    #[test]
    fn stats_count_by_kind() {
        let conn = test_conn();
        cache_page(&conn, "https://x/i", PageKind::Index, "a").unwrap();
        cache_page(&conn, "https://x/a1", PageKind::Article, "b").unwrap();
        cache_page(&conn, "https://x/a2", PageKind::Article, "c").unwrap();
        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.index_pages, 1);
        assert_eq!(stats.article_pages, 2);
        assert_eq!(stats.documents, 0);
    }

    #[test]
    fn documents_upsert_by_build() {
        use crate::document::Document;
        let conn = test_conn();
        let doc = Document {
            build: 581979,
            release_type: Some(crate::parser::ReleaseType::Release),
            release_date: Some("12/04/2023".to_string()),
            detail_url: Some("https://x/581979/".to_string()),
            markup: "\nbody\n".to_string(),
            affected: vec!["Drywall".to_string()],
        };
        save_documents(&conn, &[doc]).unwrap();
        let updated = Document {
            build: 581979,
            release_type: None,
            release_date: None,
            detail_url: None,
            markup: "\nupdated\n".to_string(),
            affected: Vec::new(),
        };
        save_documents(&conn, &[updated]).unwrap();
        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.documents, 1);
    }
}
