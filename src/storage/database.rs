//! SQLite structured-record store with migrations
//!
//! Holds video metadata, keyframe timestamps and detected objects. Every query
//! is parameterized; column names only ever come from [`TextField`].

use crate::error::{Result, VidSearchError};
use crate::storage::{KeyframeHit, KeyframeRecord, ObjectHit, ObjectRecord, VideoRecord};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Searchable metadata columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    Title,
    Description,
    Keywords,
    Author,
}

impl TextField {
    pub fn column(&self) -> &'static str {
        match self {
            TextField::Title => "title",
            TextField::Description => "description",
            TextField::Keywords => "keywords",
            TextField::Author => "author",
        }
    }

    /// Case-insensitive lookup; anything outside the whitelist is rejected
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "title" => Some(TextField::Title),
            "description" => Some(TextField::Description),
            "keywords" | "keyword" => Some(TextField::Keywords),
            "author" => Some(TextField::Author),
            _ => None,
        }
    }
}

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database file and apply pending migrations
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VidSearchError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(register_functions);

        let pool = Pool::builder().max_size(16).build(manager)?;

        {
            let conn = pool.get()?;

            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Row counts per table
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let video_count: i64 = conn.query_row("SELECT COUNT(*) FROM videos", [], |row| row.get(0))?;
        let keyframe_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM keyframes", [], |row| row.get(0))?;
        let object_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM objects", [], |row| row.get(0))?;

        Ok(DbStats {
            video_count: video_count as usize,
            keyframe_count: keyframe_count as usize,
            object_count: object_count as usize,
        })
    }

    /// Videos whose chosen fields contain `term`, title hits first
    ///
    /// Matching is case-insensitive and OR'd across fields. Ties are ordered
    /// title, then keywords, then description.
    pub fn search_videos_by_text(&self, term: &str, fields: &[TextField]) -> Result<Vec<VideoRecord>> {
        let term = term.trim();
        if term.is_empty() || fields.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = like_pattern(term);
        let conditions: Vec<String> = fields
            .iter()
            .map(|field| format!("ulower(COALESCE({}, '')) LIKE ?1 ESCAPE '\\'", field.column()))
            .collect();

        let sql = format!(
            "SELECT {} FROM videos
             WHERE {}
             ORDER BY CASE
                 WHEN ulower(COALESCE(title, '')) LIKE ?1 ESCAPE '\\' THEN 1
                 WHEN ulower(COALESCE(keywords, '')) LIKE ?1 ESCAPE '\\' THEN 2
                 WHEN ulower(COALESCE(description, '')) LIKE ?1 ESCAPE '\\' THEN 3
                 ELSE 4
             END, video_id",
            VIDEO_COLUMNS,
            conditions.join(" OR ")
        );

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pattern], video_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Keyframes containing any of `object_names` at or above `threshold`
    ///
    /// One row per keyframe, ordered by mean detector confidence then by the
    /// number of matching detections.
    pub fn search_objects(&self, object_names: &[String], threshold: f64) -> Result<Vec<ObjectHit>> {
        if object_names.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (0..object_names.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "SELECT o.video_id, o.keyframe_id,
                    GROUP_CONCAT(DISTINCT o.object_name) AS object_names,
                    AVG(o.confidence) AS avg_confidence,
                    COUNT(*) AS object_count,
                    k.pts_time, k.frame_idx
             FROM objects o
             JOIN keyframes k ON o.video_id = k.video_id AND o.keyframe_id = k.keyframe_id
             WHERE o.confidence >= ?1 AND o.object_name IN ({})
             GROUP BY o.video_id, o.keyframe_id
             ORDER BY avg_confidence DESC, object_count DESC",
            placeholders
        );

        let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(object_names.len() + 1);
        values.push(threshold.into());
        values.extend(object_names.iter().map(|name| name.to_lowercase().into()));

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            let names: Option<String> = row.get(2)?;
            Ok(ObjectHit {
                video_id: row.get(0)?,
                keyframe_id: row.get(1)?,
                object_names: names
                    .map(|s| s.split(',').map(str::to_string).collect())
                    .unwrap_or_default(),
                avg_confidence: row.get(3)?,
                object_count: row.get(4)?,
                pts_time: row.get(5)?,
                frame_idx: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Keyframes of one video with `start <= pts_time <= end`, in time order
    pub fn keyframes_in_time_range(&self, video_id: &str, start: f64, end: f64) -> Result<Vec<KeyframeHit>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT k.video_id, k.keyframe_id, k.pts_time, k.frame_idx, v.title, v.author
             FROM keyframes k
             JOIN videos v ON k.video_id = v.video_id
             WHERE k.video_id = ?1 AND k.pts_time BETWEEN ?2 AND ?3
             ORDER BY k.pts_time",
        )?;
        let rows = stmt.query_map(params![video_id, start, end], |row| {
            Ok(KeyframeHit {
                keyframe: KeyframeRecord {
                    video_id: row.get(0)?,
                    keyframe_id: row.get(1)?,
                    pts_time: row.get(2)?,
                    frame_idx: row.get(3)?,
                },
                title: row.get(4)?,
                author: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Videos filtered by length in seconds, optionally longest first
    pub fn videos_by_duration(
        &self,
        min_length: Option<i64>,
        max_length: Option<i64>,
        sort_by_duration: bool,
        limit: usize,
    ) -> Result<Vec<VideoRecord>> {
        let mut sql = format!("SELECT {} FROM videos WHERE 1=1", VIDEO_COLUMNS);
        let mut values: Vec<i64> = Vec::new();

        if let Some(min) = min_length {
            values.push(min);
            sql.push_str(&format!(" AND length >= ?{}", values.len()));
        }
        if let Some(max) = max_length {
            values.push(max);
            sql.push_str(&format!(" AND length <= ?{}", values.len()));
        }
        if sort_by_duration {
            sql.push_str(" ORDER BY length DESC");
        } else {
            sql.push_str(" ORDER BY video_id");
        }
        values.push(limit as i64);
        sql.push_str(&format!(" LIMIT ?{}", values.len()));

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), video_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn get_video_metadata(&self, video_id: &str) -> Result<Option<VideoRecord>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM videos WHERE video_id = ?1", VIDEO_COLUMNS);
        Ok(conn
            .query_row(&sql, params![video_id], video_from_row)
            .optional()?)
    }

    /// Detections in one keyframe, most confident first
    pub fn get_keyframe_objects(&self, video_id: &str, keyframe_id: &str) -> Result<Vec<ObjectRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT video_id, keyframe_id, object_name, confidence, ymin, xmin, ymax, xmax
             FROM objects
             WHERE video_id = ?1 AND keyframe_id = ?2
             ORDER BY confidence DESC",
        )?;
        let rows = stmt.query_map(params![video_id, keyframe_id], |row| {
            Ok(ObjectRecord {
                video_id: row.get(0)?,
                keyframe_id: row.get(1)?,
                object_name: row.get(2)?,
                confidence: row.get(3)?,
                ymin: row.get(4)?,
                xmin: row.get(5)?,
                ymax: row.get(6)?,
                xmax: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn insert_video(&self, video: &VideoRecord) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO videos
                (video_id, author, channel_id, channel_url, description, keywords,
                 length, publish_date, thumbnail_url, title, watch_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                video.video_id,
                video.author,
                video.channel_id,
                video.channel_url,
                video.description,
                video.keywords,
                video.length,
                video.publish_date,
                video.thumbnail_url,
                video.title,
                video.watch_url,
            ],
        )?;
        Ok(())
    }

    pub fn insert_keyframe(&self, keyframe: &KeyframeRecord) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO keyframes (video_id, keyframe_id, pts_time, frame_idx)
             VALUES (?1, ?2, ?3, ?4)",
            params![keyframe.video_id, keyframe.keyframe_id, keyframe.pts_time, keyframe.frame_idx],
        )?;
        Ok(())
    }

    pub fn insert_object(&self, object: &ObjectRecord) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO objects (video_id, keyframe_id, object_name, confidence, ymin, xmin, ymax, xmax)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                object.video_id,
                object.keyframe_id,
                object.object_name.to_lowercase(),
                object.confidence,
                object.ymin,
                object.xmin,
                object.ymax,
                object.xmax,
            ],
        )?;
        Ok(())
    }
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub video_count: usize,
    pub keyframe_count: usize,
    pub object_count: usize,
}

const VIDEO_COLUMNS: &str = "video_id, author, channel_id, channel_url, description, keywords, \
                             length, publish_date, thumbnail_url, title, watch_url";

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<VideoRecord> {
    Ok(VideoRecord {
        video_id: row.get(0)?,
        author: row.get(1)?,
        channel_id: row.get(2)?,
        channel_url: row.get(3)?,
        description: row.get(4)?,
        keywords: row.get(5)?,
        length: row.get(6)?,
        publish_date: row.get(7)?,
        thumbnail_url: row.get(8)?,
        title: row.get(9)?,
        watch_url: row.get(10)?,
    })
}

/// Unicode-aware `ulower(text)`; the built-in `LOWER` folds ASCII only
fn register_functions(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "ulower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

/// `%term%` with LIKE wildcards in the term escaped
fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE IF NOT EXISTS videos (
        video_id TEXT PRIMARY KEY,
        author TEXT,
        channel_id TEXT,
        channel_url TEXT,
        description TEXT,
        keywords TEXT,
        length INTEGER,
        publish_date TEXT,
        thumbnail_url TEXT,
        title TEXT,
        watch_url TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_videos_length ON videos(length);

    CREATE TABLE IF NOT EXISTS keyframes (
        video_id TEXT NOT NULL,
        keyframe_id TEXT NOT NULL,
        pts_time REAL NOT NULL,
        frame_idx INTEGER NOT NULL,
        PRIMARY KEY (video_id, keyframe_id),
        FOREIGN KEY (video_id) REFERENCES videos(video_id)
    );

    CREATE INDEX IF NOT EXISTS idx_keyframes_time ON keyframes(video_id, pts_time);

    CREATE TABLE IF NOT EXISTS objects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id TEXT NOT NULL,
        keyframe_id TEXT NOT NULL,
        object_name TEXT NOT NULL,
        confidence REAL NOT NULL,
        ymin REAL,
        xmin REAL,
        ymax REAL,
        xmax REAL,
        FOREIGN KEY (video_id, keyframe_id) REFERENCES keyframes(video_id, keyframe_id)
    );

    CREATE INDEX IF NOT EXISTS idx_objects_keyframe ON objects(video_id, keyframe_id);
    CREATE INDEX IF NOT EXISTS idx_objects_name ON objects(object_name, confidence);
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn video(id: &str, title: &str, keywords: &str, description: &str, length: i64) -> VideoRecord {
        VideoRecord {
            video_id: id.to_string(),
            author: Some("bếp nhà".to_string()),
            title: Some(title.to_string()),
            keywords: Some(keywords.to_string()),
            description: Some(description.to_string()),
            length: Some(length),
            ..VideoRecord::default()
        }
    }

    fn seeded() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();

        db.insert_video(&video("L01_V001", "nấu ăn ngon", "bếp", "món ăn", 600)).unwrap();
        db.insert_video(&video("L01_V002", "du lịch", "nấu ăn", "biển", 300)).unwrap();
        db.insert_video(&video("L01_V003", "thời sự", "tin tức", "dạy nấu ăn", 1200)).unwrap();

        for (frame, time) in [("001", 10.0), ("002", 65.5), ("003", 200.0)] {
            db.insert_keyframe(&KeyframeRecord {
                video_id: "L01_V001".to_string(),
                keyframe_id: frame.to_string(),
                pts_time: time,
                frame_idx: (time * 25.0) as i64,
            })
            .unwrap();
        }

        let detections = [("001", "person", 0.9), ("001", "knife", 0.7), ("002", "person", 0.6), ("003", "car", 0.95)];
        for (frame, name, confidence) in detections {
            db.insert_object(&ObjectRecord {
                video_id: "L01_V001".to_string(),
                keyframe_id: frame.to_string(),
                object_name: name.to_string(),
                confidence,
                ..ObjectRecord::default()
            })
            .unwrap();
        }

        (temp_dir, db)
    }

    #[test]
    fn test_migrations() {
        let (_temp, db) = seeded();
        let conn = db.get_conn().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i32);

        let stats = db.stats().unwrap();
        assert_eq!(stats.video_count, 3);
        assert_eq!(stats.keyframe_count, 3);
        assert_eq!(stats.object_count, 4);
    }

    #[test]
    fn test_text_search_ordering() {
        let (_temp, db) = seeded();
        let fields = [TextField::Title, TextField::Keywords, TextField::Description];
        let videos = db.search_videos_by_text("Nấu Ăn", &fields).unwrap();

        let ids: Vec<_> = videos.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(ids, vec!["L01_V001", "L01_V002", "L01_V003"]);
    }

    #[test]
    fn test_text_search_respects_fields() {
        let (_temp, db) = seeded();
        let videos = db.search_videos_by_text("nấu ăn", &[TextField::Title]).unwrap();
        assert_eq!(videos.len(), 1);

        assert!(db.search_videos_by_text("", &[TextField::Title]).unwrap().is_empty());
        assert!(db.search_videos_by_text("nấu", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_text_search_folds_non_ascii_case() {
        let (_temp, db) = seeded();
        db.insert_video(&video("L02_V001", "NẤU ĂN NGON", "", "", 60)).unwrap();
        db.insert_video(&video("L02_V002", "Tin tức", "ĐUA XE ĐẠP", "", 60)).unwrap();

        let title_hits = db.search_videos_by_text("nấu ăn", &[TextField::Title]).unwrap();
        assert!(title_hits.iter().any(|v| v.video_id == "L02_V001"));

        let keyword_hits = db.search_videos_by_text("xe đạp", &[TextField::Keywords]).unwrap();
        let ids: Vec<_> = keyword_hits.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(ids, vec!["L02_V002"]);

        let upper_query = db.search_videos_by_text("ĐUA XE", &[TextField::Keywords]).unwrap();
        assert_eq!(upper_query.len(), 1);
    }

    #[test]
    fn test_like_wildcards_escaped() {
        let (_temp, db) = seeded();
        assert!(db
            .search_videos_by_text("%", &[TextField::Title])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_object_search() {
        let (_temp, db) = seeded();
        let hits = db
            .search_objects(&["person".to_string(), "knife".to_string()], 0.5)
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].keyframe_id, "001");
        assert_eq!(hits[0].object_count, 2);
        assert!((hits[0].avg_confidence - 0.8).abs() < 1e-9);
        assert_eq!(hits[1].keyframe_id, "002");

        let strict = db.search_objects(&["person".to_string()], 0.8).unwrap();
        assert_eq!(strict.len(), 1);

        assert!(db.search_objects(&[], 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_time_range() {
        let (_temp, db) = seeded();
        let frames = db.keyframes_in_time_range("L01_V001", 60.0, 200.0).unwrap();
        let ids: Vec<_> = frames.iter().map(|f| f.keyframe.keyframe_id.as_str()).collect();
        assert_eq!(ids, vec!["002", "003"]);
        assert_eq!(frames[0].title.as_deref(), Some("nấu ăn ngon"));
    }

    #[test]
    fn test_duration_filter() {
        let (_temp, db) = seeded();
        let videos = db.videos_by_duration(Some(400), None, true, 100).unwrap();
        let ids: Vec<_> = videos.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(ids, vec!["L01_V003", "L01_V001"]);

        let capped = db.videos_by_duration(None, None, false, 2).unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn test_metadata_and_objects() {
        let (_temp, db) = seeded();
        assert!(db.get_video_metadata("L01_V001").unwrap().is_some());
        assert!(db.get_video_metadata("missing").unwrap().is_none());

        let objects = db.get_keyframe_objects("L01_V001", "001").unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].object_name, "person");
    }

    #[test]
    fn test_text_field_whitelist() {
        assert_eq!(TextField::parse("Title"), Some(TextField::Title));
        assert_eq!(TextField::parse("keyword"), Some(TextField::Keywords));
        assert_eq!(TextField::parse("title; DROP TABLE videos"), None);
    }
}
