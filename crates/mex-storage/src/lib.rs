//! Remote store boundary: the `MissionStore` contract, its Postgres
//! implementation, and an in-memory fixture store for tests and DB-less
//! runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use mex_core::{Level, MateriRow, SessionRow, Source};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use thiserror::Error;

pub const CRATE_NAME: &str = "mex-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("{0}")]
    Message(String),
}

/// Query capabilities the explorer needs from the relational store:
/// the level reference list, recent session occurrences joined to their
/// material and level, and a single material row for the detail overlay.
#[async_trait]
pub trait MissionStore: Send + Sync {
    /// All levels, ordered by `kode`.
    async fn levels(&self) -> Result<Vec<Level>, StoreError>;

    /// Most recent session rows of one source, newest first. When
    /// `level_id` is given the join is inner and filtered to materials
    /// of that level; otherwise broken material references still come
    /// back (with `materi: None`) and are dropped downstream.
    async fn recent_sessions(
        &self,
        source: Source,
        level_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<SessionRow>, StoreError>;

    /// One full material row by id, joined to its level.
    async fn material_detail(
        &self,
        source: Source,
        materi_id: i64,
    ) -> Result<Option<MateriRow>, StoreError>;
}

/// Postgres-backed store over the four relations named in the data
/// model: `pertemuan_kelas`, `pertemuan_private`, `materi` /
/// `materi_private`, and `levels`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

fn session_table(source: Source) -> &'static str {
    match source {
        Source::Sekolah => "pertemuan_kelas",
        Source::Private => "pertemuan_private",
    }
}

fn materi_table(source: Source) -> &'static str {
    match source {
        Source::Sekolah => "materi",
        Source::Private => "materi_private",
    }
}

// The school tables name their text columns title/description, the
// private ones judul/deskripsi. Queries alias nothing; the row mappers
// below populate only the pair a source actually has.
fn materi_text_columns(source: Source) -> (&'static str, &'static str) {
    match source {
        Source::Sekolah => ("title", "description"),
        Source::Private => ("judul", "deskripsi"),
    }
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        tracing::debug!("connected to mission store");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn sessions_sql(source: Source, filtered: bool) -> String {
        let (title_col, desc_col) = materi_text_columns(source);
        let join = if filtered { "JOIN" } else { "LEFT JOIN" };
        let filter = if filtered {
            "WHERE m.level_id = $2"
        } else {
            ""
        };
        format!(
            r#"
            SELECT p.tanggal,
                   m.id        AS materi_id,
                   m.{title_col}  AS materi_title,
                   m.{desc_col}   AS materi_description,
                   m.detail    AS detail,
                   m.image_url AS image_url,
                   m.level_id  AS level_id,
                   l.kode      AS level_kode
              FROM {session} p
              {join} {materi} m ON m.id = p.materi_id
              LEFT JOIN levels l ON l.id = m.level_id
              {filter}
             ORDER BY p.tanggal DESC
             LIMIT $1
            "#,
            session = session_table(source),
            materi = materi_table(source),
        )
    }

    fn session_row(row: &PgRow, source: Source) -> Result<SessionRow, StoreError> {
        let tanggal: NaiveDate = row.try_get("tanggal")?;
        let materi_id: Option<i64> = row.try_get("materi_id")?;
        let materi = match materi_id {
            Some(id) => {
                let title: Option<String> = row.try_get("materi_title")?;
                let description: Option<String> = row.try_get("materi_description")?;
                let mut m = MateriRow {
                    id,
                    detail: row.try_get("detail")?,
                    image_url: row.try_get("image_url")?,
                    level_id: row.try_get("level_id")?,
                    level_kode: row.try_get("level_kode")?,
                    ..MateriRow::default()
                };
                match source {
                    Source::Sekolah => {
                        m.title = title;
                        m.description = description;
                    }
                    Source::Private => {
                        m.judul = title;
                        m.deskripsi = description;
                    }
                }
                Some(m)
            }
            None => None,
        };
        Ok(SessionRow { tanggal, materi })
    }

    fn detail_row(row: &PgRow, source: Source) -> Result<MateriRow, StoreError> {
        let title: Option<String> = row.try_get("materi_title")?;
        let description: Option<String> = row.try_get("materi_description")?;
        let mut m = MateriRow {
            id: row.try_get("id")?,
            detail: row.try_get("detail")?,
            image_url: row.try_get("image_url")?,
            level_id: row.try_get("level_id")?,
            level_kode: row.try_get("level_kode")?,
            ..MateriRow::default()
        };
        match source {
            Source::Sekolah => {
                m.title = title;
                m.description = description;
            }
            Source::Private => {
                m.judul = title;
                m.deskripsi = description;
            }
        }
        Ok(m)
    }
}

#[async_trait]
impl MissionStore for PgStore {
    async fn levels(&self) -> Result<Vec<Level>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, kode
              FROM levels
             ORDER BY kode
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Level {
                id: row.try_get("id")?,
                kode: row.try_get("kode")?,
            });
        }
        Ok(out)
    }

    async fn recent_sessions(
        &self,
        source: Source,
        level_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<SessionRow>, StoreError> {
        let sql = Self::sessions_sql(source, level_id.is_some());
        let mut query = sqlx::query(&sql).bind(limit);
        if let Some(level_id) = level_id {
            query = query.bind(level_id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(Self::session_row(row, source)?);
        }
        Ok(out)
    }

    async fn material_detail(
        &self,
        source: Source,
        materi_id: i64,
    ) -> Result<Option<MateriRow>, StoreError> {
        let (title_col, desc_col) = materi_text_columns(source);
        let sql = format!(
            r#"
            SELECT m.id,
                   m.{title_col}  AS materi_title,
                   m.{desc_col}   AS materi_description,
                   m.detail    AS detail,
                   m.image_url AS image_url,
                   m.level_id  AS level_id,
                   l.kode      AS level_kode
              FROM {materi} m
              LEFT JOIN levels l ON l.id = m.level_id
             WHERE m.id = $1
            "#,
            materi = materi_table(source),
        );
        let row = sqlx::query(&sql)
            .bind(materi_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(Self::detail_row(&row, source)?)),
            None => Ok(None),
        }
    }
}

/// In-memory fixture store. Backs the handler tests and the DB-less
/// `serve` fallback; failure flags let tests exercise the degrade-to-
/// empty policy without a real transport error.
#[derive(Debug, Default)]
pub struct MemoryStore {
    levels: Vec<Level>,
    sessions: HashMap<Source, Vec<SessionRow>>,
    details: HashMap<(Source, i64), MateriRow>,
    fail_levels: bool,
    fail_sources: Vec<Source>,
    fail_details: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_levels(mut self, levels: Vec<Level>) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_sessions(mut self, source: Source, rows: Vec<SessionRow>) -> Self {
        self.sessions.entry(source).or_default().extend(rows);
        self
    }

    pub fn with_detail(mut self, source: Source, materi: MateriRow) -> Self {
        self.details.insert((source, materi.id), materi);
        self
    }

    pub fn failing_levels(mut self) -> Self {
        self.fail_levels = true;
        self
    }

    pub fn failing_source(mut self, source: Source) -> Self {
        self.fail_sources.push(source);
        self
    }

    pub fn failing_details(mut self) -> Self {
        self.fail_details = true;
        self
    }

    fn simulated_failure(what: &str) -> StoreError {
        StoreError::Message(format!("simulated {what} failure"))
    }
}

#[async_trait]
impl MissionStore for MemoryStore {
    async fn levels(&self) -> Result<Vec<Level>, StoreError> {
        if self.fail_levels {
            return Err(Self::simulated_failure("levels"));
        }
        let mut levels = self.levels.clone();
        levels.sort_by(|a, b| a.kode.cmp(&b.kode));
        Ok(levels)
    }

    async fn recent_sessions(
        &self,
        source: Source,
        level_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<SessionRow>, StoreError> {
        if self.fail_sources.contains(&source) {
            return Err(Self::simulated_failure("sessions"));
        }
        let mut rows: Vec<SessionRow> = self
            .sessions
            .get(&source)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|row| match level_id {
                Some(level_id) => row
                    .materi
                    .as_ref()
                    .and_then(|m| m.level_id)
                    .is_some_and(|id| id == level_id),
                None => true,
            })
            .collect();
        rows.sort_by(|a, b| b.tanggal.cmp(&a.tanggal));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn material_detail(
        &self,
        source: Source,
        materi_id: i64,
    ) -> Result<Option<MateriRow>, StoreError> {
        if self.fail_details {
            return Err(Self::simulated_failure("detail"));
        }
        Ok(self.details.get(&(source, materi_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn session(day: u32, materi_id: i64, level_id: i64) -> SessionRow {
        SessionRow {
            tanggal: date(2026, 1, day),
            materi: Some(MateriRow {
                id: materi_id,
                level_id: Some(level_id),
                ..MateriRow::default()
            }),
        }
    }

    #[test]
    fn sessions_sql_targets_source_tables() {
        let sekolah = PgStore::sessions_sql(Source::Sekolah, false);
        assert!(sekolah.contains("FROM pertemuan_kelas"));
        assert!(sekolah.contains("LEFT JOIN materi m"));
        assert!(sekolah.contains("m.title"));

        let private = PgStore::sessions_sql(Source::Private, false);
        assert!(private.contains("FROM pertemuan_private"));
        assert!(private.contains("materi_private m"));
        assert!(private.contains("m.judul"));
    }

    #[test]
    fn filtered_sessions_sql_uses_inner_join() {
        let sql = PgStore::sessions_sql(Source::Sekolah, true);
        assert!(!sql.contains("LEFT JOIN materi m"));
        assert!(sql.contains("JOIN materi m ON m.id = p.materi_id"));
        assert!(sql.contains("WHERE m.level_id = $2"));
    }

    #[tokio::test]
    async fn memory_store_orders_levels_by_kode() {
        let store = MemoryStore::new().with_levels(vec![
            Level { id: 2, kode: "Robotic".to_string() },
            Level { id: 1, kode: "Beginner".to_string() },
        ]);
        let levels = store.levels().await.unwrap();
        assert_eq!(levels[0].kode, "Beginner");
        assert_eq!(levels[1].kode, "Robotic");
    }

    #[tokio::test]
    async fn memory_store_filters_sorts_and_limits_sessions() {
        let store = MemoryStore::new().with_sessions(
            Source::Sekolah,
            vec![session(1, 1, 10), session(9, 2, 10), session(5, 3, 20)],
        );
        let rows = store
            .recent_sessions(Source::Sekolah, Some(10), 1)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tanggal, date(2026, 1, 9));
    }

    #[tokio::test]
    async fn memory_store_failure_flags_surface_as_errors() {
        let store = MemoryStore::new().failing_source(Source::Private);
        assert!(store
            .recent_sessions(Source::Private, None, 10)
            .await
            .is_err());
        assert!(store
            .recent_sessions(Source::Sekolah, None, 10)
            .await
            .is_ok());
    }
}
