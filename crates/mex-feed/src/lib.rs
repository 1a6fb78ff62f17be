//! Feed aggregation: parallel two-source fetches merged under the
//! first-seen-wins dedup policy, with silent degradation on fetch
//! failure.

use mex_core::{merge_missions, normalize, Level, Mission, Source};
use mex_storage::MissionStore;
use tracing::warn;

pub const CRATE_NAME: &str = "mex-feed";

/// Per-source fetch limit for the global live feed.
pub const LIVE_FETCH_LIMIT: i64 = 10;
/// Rendered cap of the global live feed after merge.
pub const LIVE_FEED_CAP: usize = 8;
/// Per-source fetch limit for a level-scoped row (never truncated).
pub const LEVEL_FETCH_LIMIT: i64 = 15;

/// One non-empty per-level section of the explorer page.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelRow {
    pub level: Level,
    pub missions: Vec<Mission>,
}

/// Fetches and normalizes one source. A transport or query failure
/// degrades to an empty list: the feed is editorial content and partial
/// data beats no page.
async fn fetch_normalized(
    store: &dyn MissionStore,
    source: Source,
    level_id: Option<i64>,
    limit: i64,
) -> Vec<Mission> {
    match store.recent_sessions(source, level_id, limit).await {
        Ok(rows) => rows.iter().filter_map(|row| normalize(row, source)).collect(),
        Err(err) => {
            warn!(source = source.as_str(), %err, "session fetch failed, degrading to empty list");
            Vec::new()
        }
    }
}

/// Global feed: the two source fetches run concurrently, results are
/// merged (school first), and the list is capped at [`LIVE_FEED_CAP`].
pub async fn load_live_missions(store: &dyn MissionStore) -> Vec<Mission> {
    let (sekolah, private) = tokio::join!(
        fetch_normalized(store, Source::Sekolah, None, LIVE_FETCH_LIMIT),
        fetch_normalized(store, Source::Private, None, LIVE_FETCH_LIMIT),
    );
    let mut merged = merge_missions(sekolah, private);
    merged.truncate(LIVE_FEED_CAP);
    merged
}

/// Per-level rows, in level order. Levels are processed one at a time;
/// only the two source fetches within a level run concurrently. Levels
/// with no qualifying history produce no row.
pub async fn load_level_rows(store: &dyn MissionStore, levels: &[Level]) -> Vec<LevelRow> {
    let mut rows = Vec::new();
    for level in levels {
        let (sekolah, private) = tokio::join!(
            fetch_normalized(store, Source::Sekolah, Some(level.id), LEVEL_FETCH_LIMIT),
            fetch_normalized(store, Source::Private, Some(level.id), LEVEL_FETCH_LIMIT),
        );
        let missions = merge_missions(sekolah, private);
        if !missions.is_empty() {
            rows.push(LevelRow {
                level: level.clone(),
                missions,
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mex_core::{MateriRow, SessionRow};
    use mex_storage::MemoryStore;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
    }

    fn session(day: u32, materi_id: i64) -> SessionRow {
        SessionRow {
            tanggal: date(day),
            materi: Some(MateriRow {
                id: materi_id,
                title: Some(format!("Materi {materi_id}")),
                level_id: Some(1),
                ..MateriRow::default()
            }),
        }
    }

    fn sessions(days_and_ids: &[(u32, i64)]) -> Vec<SessionRow> {
        days_and_ids.iter().map(|&(d, id)| session(d, id)).collect()
    }

    #[tokio::test]
    async fn live_feed_caps_at_eight_entries() {
        let store = MemoryStore::new()
            .with_sessions(
                Source::Sekolah,
                sessions(&[(1, 1), (2, 2), (3, 3), (4, 4), (5, 5), (6, 6), (7, 7), (8, 8), (9, 9), (10, 10)]),
            )
            .with_sessions(
                Source::Private,
                sessions(&[(11, 11), (12, 12), (13, 13), (14, 14), (15, 15), (16, 16), (17, 17), (18, 18), (19, 19), (20, 20)]),
            );
        let feed = load_live_missions(&store).await;
        assert_eq!(feed.len(), LIVE_FEED_CAP);
        // Newest across both sources come first.
        assert_eq!(feed[0].id, 20);
        assert_eq!(feed[0].source, Source::Private);
    }

    #[tokio::test]
    async fn live_feed_swallows_one_failing_source() {
        let store = MemoryStore::new()
            .with_sessions(Source::Sekolah, sessions(&[(3, 1), (5, 2)]))
            .failing_source(Source::Private);
        let feed = load_live_missions(&store).await;
        assert_eq!(feed.len(), 2);
        assert!(feed.iter().all(|m| m.source == Source::Sekolah));
    }

    #[tokio::test]
    async fn live_feed_is_empty_when_both_sources_fail() {
        let store = MemoryStore::new()
            .failing_source(Source::Sekolah)
            .failing_source(Source::Private);
        assert!(load_live_missions(&store).await.is_empty());
    }

    #[tokio::test]
    async fn live_feed_drops_rows_with_broken_material_reference() {
        let broken = SessionRow {
            tanggal: date(9),
            materi: None,
        };
        let store = MemoryStore::new()
            .with_sessions(Source::Sekolah, vec![broken, session(3, 1)]);
        let feed = load_live_missions(&store).await;
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id, 1);
    }

    #[tokio::test]
    async fn live_feed_tie_break_keeps_school_instance() {
        let store = MemoryStore::new()
            .with_sessions(Source::Sekolah, sessions(&[(7, 42)]))
            .with_sessions(Source::Private, sessions(&[(7, 42)]));
        let feed = load_live_missions(&store).await;
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].source, Source::Sekolah);
    }

    #[tokio::test]
    async fn level_rows_skip_levels_without_history() {
        let mut with_level = session(4, 5);
        with_level.materi.as_mut().unwrap().level_id = Some(2);
        let store = MemoryStore::new()
            .with_sessions(Source::Sekolah, vec![with_level])
            .with_levels(vec![
                Level { id: 1, kode: "Beginner".to_string() },
                Level { id: 2, kode: "Robotic".to_string() },
            ]);
        let levels = store.levels().await.unwrap();
        let rows = load_level_rows(&store, &levels).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].level.kode, "Robotic");
        assert_eq!(rows[0].missions.len(), 1);
    }

    #[tokio::test]
    async fn level_rows_are_not_truncated_to_the_live_cap() {
        let rows: Vec<SessionRow> = (1..=12).map(|i| session(i as u32, i)).collect();
        let store = MemoryStore::new()
            .with_sessions(Source::Sekolah, rows)
            .with_levels(vec![Level { id: 1, kode: "Beginner".to_string() }]);
        let levels = store.levels().await.unwrap();
        let out = load_level_rows(&store, &levels).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].missions.len(), 12);
    }
}
