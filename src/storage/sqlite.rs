//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the `PersistenceSink`
//! and `ProgressStore` traits. The connection sits behind a mutex so one
//! `SqliteStorage` can be shared by every worker of a run; the lock is only
//! ever held for the duration of a single statement or transaction.

use crate::crawler::{Article, AssetRef};
use crate::state::{RunStats, RunStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    PersistenceSink, ProgressStore, SslInfo, StorageError, StorageResult,
};
use crate::storage::{LogEntry, LogLevel};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for concurrent readers and a single writer
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Gets the stored assets of a page, in insertion order
    pub fn get_assets(&self, page_id: i64) -> StorageResult<Vec<(String, String, Option<String>)>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT type, url, cloud_url FROM assets WHERE page_id = ?1 ORDER BY id")?;

        let assets = stmt
            .query_map(params![page_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(assets)
    }

    /// Gets the page ID stored for a URL
    pub fn get_page_id(&self, url: &str) -> StorageResult<Option<i64>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM crawled_pages WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> Option<String> {
    time.map(|t| t.to_rfc3339())
}

fn parse_time(value: Option<String>) -> StorageResult<Option<DateTime<Utc>>> {
    match value {
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| StorageError::Corrupt(format!("bad timestamp '{}': {}", s, e))),
        None => Ok(None),
    }
}

impl PersistenceSink for SqliteStorage {
    // ===== Page Data =====

    fn insert_page(
        &self,
        url: &str,
        domain: &str,
        title: &str,
        body: &str,
        status_code: u16,
        content_type: &str,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        let id = conn.query_row(
            "INSERT INTO crawled_pages (url, domain, title, content, status_code, content_type, crawled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                status_code = excluded.status_code,
                content_type = excluded.content_type,
                crawled_at = excluded.crawled_at
             RETURNING id",
            params![url, domain, title, body, status_code, content_type, now],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn insert_metadata_batch(
        &self,
        page_id: i64,
        metadata: &BTreeMap<String, String>,
    ) -> StorageResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO page_metadata (page_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(page_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
            )?;
            for (key, value) in metadata {
                stmt.execute(params![page_id, key, value])?;
            }
        }
        tx.commit()?;
        Ok(metadata.len())
    }

    fn insert_asset_batch(&self, page_id: i64, assets: &[AssetRef]) -> StorageResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO assets (page_id, type, url, file_size, cloud_url) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(page_id, url) DO UPDATE SET
                    file_size = excluded.file_size,
                    cloud_url = excluded.cloud_url",
            )?;
            for asset in assets {
                stmt.execute(params![
                    page_id,
                    asset.kind.as_str(),
                    asset.source_url.as_str(),
                    asset.size.map(|s| s as i64),
                    asset.uploaded_url,
                ])?;
            }
        }
        tx.commit()?;
        Ok(assets.len())
    }

    fn insert_article(&self, page_id: i64, article: &Article) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO articles (page_id, headline, author, published_date, article_text)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(page_id) DO UPDATE SET
                headline = excluded.headline,
                author = excluded.author,
                published_date = excluded.published_date,
                article_text = excluded.article_text",
            params![
                page_id,
                article.headline,
                article.author,
                article.published_date,
                article.text
            ],
        )?;
        Ok(())
    }

    // ===== Run Reporting =====

    fn append_log(&self, domain: &str, message: &str, level: LogLevel) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO crawl_logs (domain, message, level, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![domain, message, level.as_str(), now],
        )?;
        Ok(())
    }

    fn upsert_run_stats(&self, domain: &str, stats: &RunStats) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO crawl_statistics
                (domain, total_pages, failed_pages, total_assets, status, start_time, end_time, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(domain) DO UPDATE SET
                total_pages = excluded.total_pages,
                failed_pages = excluded.failed_pages,
                total_assets = excluded.total_assets,
                status = excluded.status,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                updated_at = excluded.updated_at",
            params![
                domain,
                stats.pages_crawled as i64,
                stats.pages_failed as i64,
                stats.assets_uploaded as i64,
                stats.status.to_db_string(),
                format_time(stats.start_time),
                format_time(stats.end_time),
                now
            ],
        )?;
        Ok(())
    }

    fn upsert_ssl_info(
        &self,
        domain: &str,
        issuer: Option<&str>,
        expiry: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO ssl_info (domain, provider, expiry_date, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(domain) DO UPDATE SET
                provider = excluded.provider,
                expiry_date = excluded.expiry_date,
                updated_at = excluded.updated_at",
            params![domain, issuer, format_time(expiry), now],
        )?;
        Ok(())
    }

    // ===== Readers =====

    fn get_run_stats(&self, domain: &str) -> StorageResult<Option<RunStats>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT total_pages, failed_pages, total_assets, status, start_time, end_time
                 FROM crawl_statistics WHERE domain = ?1",
                params![domain],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((pages, failed, assets, status, start, end)) = row else {
            return Ok(None);
        };

        let status = RunStatus::from_db_string(&status)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown run status '{}'", status)))?;

        Ok(Some(RunStats {
            pages_crawled: pages as u64,
            pages_failed: failed as u64,
            assets_uploaded: assets as u64,
            status,
            start_time: parse_time(start)?,
            end_time: parse_time(end)?,
        }))
    }

    fn get_recent_logs(&self, domain: &str, limit: usize) -> StorageResult<Vec<LogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, level, message FROM crawl_logs
             WHERE domain = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![domain, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (timestamp, level, message) in rows.into_iter().rev() {
            let time = parse_time(Some(timestamp))?.unwrap_or_else(Utc::now);
            entries.push(LogEntry {
                time,
                level: LogLevel::from_db_string(&level).unwrap_or(LogLevel::Info),
                message,
            });
        }

        Ok(entries)
    }

    fn count_pages(&self, domain: &str) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM crawled_pages WHERE domain = ?1",
            params![domain],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn get_ssl_info(&self, domain: &str) -> StorageResult<Option<SslInfo>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT provider, expiry_date FROM ssl_info WHERE domain = ?1",
                params![domain],
                |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        match row {
            Some((issuer, expiry)) => Ok(Some(SslInfo {
                issuer,
                expiry: parse_time(expiry)?,
            })),
            None => Ok(None),
        }
    }
}

impl ProgressStore for SqliteStorage {
    fn set_counter(&self, domain: &str, value: f64) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO progress (domain, counter) VALUES (?1, ?2)
             ON CONFLICT(domain) DO UPDATE SET counter = excluded.counter",
            params![domain, value],
        )?;
        Ok(())
    }

    fn increment_counter(&self, domain: &str, amount: f64) -> StorageResult<f64> {
        let conn = self.conn()?;
        let value = conn.query_row(
            "INSERT INTO progress (domain, counter) VALUES (?1, ?2)
             ON CONFLICT(domain) DO UPDATE SET counter = counter + excluded.counter
             RETURNING counter",
            params![domain, amount],
            |row| row.get(0),
        )?;
        Ok(value)
    }

    fn get_counter(&self, domain: &str) -> StorageResult<f64> {
        let conn = self.conn()?;
        let value: Option<f64> = conn
            .query_row(
                "SELECT counter FROM progress WHERE domain = ?1",
                params![domain],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0.0))
    }

    fn set_target(&self, domain: &str, target: u64) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO progress (domain, counter, target) VALUES (?1, 0, ?2)
             ON CONFLICT(domain) DO UPDATE SET target = excluded.target",
            params![domain, target as i64],
        )?;
        Ok(())
    }

    fn get_target(&self, domain: &str) -> StorageResult<Option<u64>> {
        let conn = self.conn()?;
        let target: Option<Option<i64>> = conn
            .query_row(
                "SELECT target FROM progress WHERE domain = ?1",
                params![domain],
                |row| row.get(0),
            )
            .optional()?;
        Ok(target.flatten().map(|t| t as u64))
    }

    fn reset(&self, domain: &str) -> StorageResult<()> {
        self.set_counter(domain, 0.0)
    }
}
