//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Site-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per crawled page, unique by URL
CREATE TABLE IF NOT EXISTS crawled_pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    domain TEXT NOT NULL,
    title TEXT,
    content TEXT,
    status_code INTEGER,
    content_type TEXT,
    crawled_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawled_pages_domain ON crawled_pages(domain);

-- Meta tags per page
CREATE TABLE IF NOT EXISTS page_metadata (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES crawled_pages(id) ON DELETE CASCADE,
    meta_key TEXT NOT NULL,
    meta_value TEXT,
    UNIQUE(page_id, meta_key)
);

-- Images, scripts, and stylesheets per page
CREATE TABLE IF NOT EXISTS assets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES crawled_pages(id) ON DELETE CASCADE,
    type TEXT NOT NULL,
    url TEXT NOT NULL,
    file_size INTEGER,
    cloud_url TEXT,
    UNIQUE(page_id, url)
);

CREATE INDEX IF NOT EXISTS idx_assets_page ON assets(page_id);

-- Article body extracted from a page
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL UNIQUE REFERENCES crawled_pages(id) ON DELETE CASCADE,
    headline TEXT,
    author TEXT,
    published_date TEXT,
    article_text TEXT
);

-- Latest run statistics per domain
CREATE TABLE IF NOT EXISTS crawl_statistics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL UNIQUE,
    total_pages INTEGER NOT NULL DEFAULT 0,
    failed_pages INTEGER NOT NULL DEFAULT 0,
    total_assets INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    start_time TEXT,
    end_time TEXT,
    updated_at TEXT NOT NULL
);

-- Run log lines per domain
CREATE TABLE IF NOT EXISTS crawl_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL,
    message TEXT NOT NULL,
    level TEXT NOT NULL DEFAULT 'INFO',
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_logs_domain ON crawl_logs(domain, id);

-- Certificate seen during the last verification of a domain
CREATE TABLE IF NOT EXISTS ssl_info (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL UNIQUE,
    provider TEXT,
    expiry_date TEXT,
    updated_at TEXT NOT NULL
);

-- Live progress counters
CREATE TABLE IF NOT EXISTS progress (
    domain TEXT PRIMARY KEY,
    counter REAL NOT NULL DEFAULT 0,
    target INTEGER
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let tables = [
            "crawled_pages",
            "page_metadata",
            "assets",
            "articles",
            "crawl_statistics",
            "crawl_logs",
            "progress",
            "ssl_info",
        ];

        for table in tables {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
