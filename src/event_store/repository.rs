//! EventStore Repository
//!
//! SQLite access layer (sqlx)

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

use super::types::*;
use super::EventStore;
use crate::error::{Error, Result};
use crate::event_normalizer::NormalizedEvent;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        etype TEXT NOT NULL,
        trdesc TEXT NOT NULL,
        staffname TEXT NOT NULL,
        staffno TEXT NOT NULL,
        cardno TEXT,
        devname TEXT NOT NULL,
        trdate TEXT NOT NULL,
        trtime TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        raw_xml TEXT,
        snapshot_path TEXT,
        stream_url TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS staff (
        staffno TEXT PRIMARY KEY,
        staffname TEXT NOT NULL,
        cardno TEXT,
        last_in_snapshot TEXT,
        last_out_snapshot TEXT,
        last_updated INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS door_cameras (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        devname TEXT UNIQUE NOT NULL,
        camera_ip TEXT NOT NULL,
        camera_port INTEGER DEFAULT 80,
        camera_username TEXT NOT NULL,
        camera_password TEXT NOT NULL,
        stream_url TEXT,
        onvif_enabled INTEGER DEFAULT 1
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_events_trdate ON events(trdate DESC)",
    "CREATE INDEX IF NOT EXISTS idx_events_devname ON events(devname)",
    "CREATE INDEX IF NOT EXISTS idx_events_staffno ON events(staffno)",
];

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Event SELECT columns
const EVENT_COLUMNS: &str = r#"
    id, etype, trdesc, staffname, staffno, cardno, devname, trdate, trtime,
    timestamp, raw_xml, snapshot_path, stream_url
"#;

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Open (or create) the database file and ensure the schema exists
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database (single connection so every query sees it)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(pool).await
    }

    /// Wrap an existing pool and ensure the schema exists
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        tracing::info!("Database initialized successfully");
        Ok(Self { pool })
    }

    /// Underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================================
    // Event history
    // ========================================

    /// Most recent events first
    pub async fn recent_events(&self, limit: i64) -> Result<Vec<EventRecord>> {
        let query = format!(
            "SELECT {} FROM events ORDER BY timestamp DESC, id DESC LIMIT ?",
            EVENT_COLUMNS
        );
        let events = sqlx::query_as::<_, EventRecord>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    /// Events within an optional time window, newest first
    pub async fn events_in_range(&self, q: &EventQuery) -> Result<Vec<EventRecord>> {
        let mut query = format!("SELECT {} FROM events WHERE 1=1", EVENT_COLUMNS);
        if q.from.is_some() {
            query.push_str(" AND timestamp >= ?");
        }
        if q.to.is_some() {
            query.push_str(" AND timestamp <= ?");
        }
        query.push_str(" ORDER BY timestamp DESC, id DESC");
        if q.limit.is_some() {
            query.push_str(" LIMIT ?");
        }

        let mut stmt = sqlx::query_as::<_, EventRecord>(&query);
        if let Some(from) = q.from {
            stmt = stmt.bind(from);
        }
        if let Some(to) = q.to {
            stmt = stmt.bind(to);
        }
        if let Some(limit) = q.limit {
            stmt = stmt.bind(limit);
        }

        Ok(stmt.fetch_all(&self.pool).await?)
    }

    /// Events from the last `days` days
    pub async fn events_from_last_days(&self, days: i64) -> Result<Vec<EventRecord>> {
        let window_ms = days.max(0).saturating_mul(MS_PER_DAY);
        let cutoff = chrono::Utc::now().timestamp_millis().saturating_sub(window_ms);
        self.events_in_range(&EventQuery {
            from: Some(cutoff),
            ..Default::default()
        })
        .await
    }

    // ========================================
    // Staff
    // ========================================

    pub async fn get_staff_by_card(&self, cardno: &str) -> Result<Option<StaffRecord>> {
        let staff = sqlx::query_as::<_, StaffRecord>("SELECT * FROM staff WHERE cardno = ?")
            .bind(cardno)
            .fetch_optional(&self.pool)
            .await?;
        Ok(staff)
    }

    pub async fn list_staff(&self) -> Result<Vec<StaffRecord>> {
        let staff = sqlx::query_as::<_, StaffRecord>("SELECT * FROM staff ORDER BY staffname")
            .fetch_all(&self.pool)
            .await?;
        Ok(staff)
    }

    // ========================================
    // Door cameras
    // ========================================

    pub async fn upsert_door_camera(&self, camera: &DoorCamera) -> Result<()> {
        if camera.devname.trim().is_empty() || camera.camera_ip.trim().is_empty() {
            return Err(Error::Validation(
                "devname and camera_ip are required".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO door_cameras (devname, camera_ip, camera_port, camera_username, camera_password, stream_url, onvif_enabled)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(devname) DO UPDATE SET
                camera_ip = excluded.camera_ip,
                camera_port = excluded.camera_port,
                camera_username = excluded.camera_username,
                camera_password = excluded.camera_password,
                stream_url = excluded.stream_url,
                onvif_enabled = excluded.onvif_enabled
            "#,
        )
        .bind(&camera.devname)
        .bind(&camera.camera_ip)
        .bind(camera.camera_port)
        .bind(&camera.camera_username)
        .bind(&camera.camera_password)
        .bind(&camera.stream_url)
        .bind(camera.onvif_enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_door_cameras(&self) -> Result<Vec<DoorCamera>> {
        let cameras =
            sqlx::query_as::<_, DoorCamera>("SELECT * FROM door_cameras ORDER BY devname")
                .fetch_all(&self.pool)
                .await?;
        Ok(cameras)
    }

    pub async fn delete_door_camera(&self, devname: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM door_cameras WHERE devname = ?")
            .bind(devname)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Close the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn insert_event(&self, event: &NormalizedEvent) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO events (etype, trdesc, staffname, staffno, cardno, devname, trdate, trtime, timestamp, raw_xml, snapshot_path, stream_url)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL)
            "#,
        )
        .bind(&event.etype)
        .bind(&event.trdesc)
        .bind(&event.staffname)
        .bind(&event.staffno)
        .bind(&event.cardno)
        .bind(&event.devname)
        .bind(&event.trdate)
        .bind(&event.trtime)
        .bind(event.ingested_at.timestamp_millis())
        .bind(event.raw_xml())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_event_by_id(&self, id: i64) -> Result<Option<EventRecord>> {
        let query = format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS);
        let event = sqlx::query_as::<_, EventRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    async fn update_event_snapshot(
        &self,
        id: i64,
        snapshot_path: &str,
        stream_url: Option<String>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE events SET snapshot_path = ?, stream_url = ? WHERE id = ?")
            .bind(snapshot_path)
            .bind(stream_url)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_staff(
        &self,
        staffno: &str,
        staffname: &str,
        cardno: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO staff (staffno, staffname, cardno, last_updated)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(staffno) DO UPDATE SET
                staffname = excluded.staffname,
                cardno = COALESCE(excluded.cardno, staff.cardno),
                last_updated = excluded.last_updated
            "#,
        )
        .bind(staffno)
        .bind(staffname)
        .bind(cardno)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_staff_snapshot(
        &self,
        cardno: &str,
        snapshot_path: &str,
        is_in: bool,
    ) -> Result<bool> {
        let sql = if is_in {
            "UPDATE staff SET last_in_snapshot = ?, last_updated = ? WHERE cardno = ?"
        } else {
            "UPDATE staff SET last_out_snapshot = ?, last_updated = ? WHERE cardno = ?"
        };

        let result = sqlx::query(sql)
            .bind(snapshot_path)
            .bind(chrono::Utc::now().timestamp_millis())
            .bind(cardno)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_door_camera(&self, devname: &str) -> Result<Option<DoorCamera>> {
        let camera = sqlx::query_as::<_, DoorCamera>("SELECT * FROM door_cameras WHERE devname = ?")
            .bind(devname)
            .fetch_optional(&self.pool)
            .await?;
        Ok(camera)
    }
}
