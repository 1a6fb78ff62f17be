//! Core domain model and merge rules for the mission explorer.
//!
//! Everything here is pure: the raw session shapes handed over by the
//! store, the canonical [`Mission`] record, and the normalize/merge
//! pipeline that absorbs the schema divergence between the school and
//! private source tables.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "mex-core";

/// Level code substituted when the nested `levels` join is missing.
pub const DEFAULT_LEVEL_KODE: &str = "ROBOT";

/// Difficulty/category tier reference row. Loaded once at startup and
/// held as an immutable snapshot for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub id: i64,
    pub kode: String,
}

/// Session origin tag. Also selects which pair of tables a query hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Sekolah,
    Private,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Sekolah => "sekolah",
            Source::Private => "private",
        }
    }

    /// Parses the wire tag used in card activation payloads.
    pub fn parse(tag: &str) -> Option<Source> {
        match tag {
            "sekolah" => Some(Source::Sekolah),
            "private" => Some(Source::Private),
            _ => None,
        }
    }
}

/// Raw joined session row as returned by the store, before normalization.
/// `materi` is `None` when the material reference is broken (deleted row,
/// dangling foreign key); such rows are dropped during normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub tanggal: NaiveDate,
    pub materi: Option<MateriRow>,
}

/// Material columns under both source namings. The private tables use
/// `judul`/`deskripsi`, the school tables `title`/`description`; a row
/// from either source populates only its own pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MateriRow {
    pub id: i64,
    pub judul: Option<String>,
    pub title: Option<String>,
    pub deskripsi: Option<String>,
    pub description: Option<String>,
    pub detail: Option<String>,
    pub image_url: Option<String>,
    pub level_id: Option<i64>,
    pub level_kode: Option<String>,
}

impl MateriRow {
    /// First non-empty of the private and school title columns.
    pub fn resolved_title(&self) -> Option<String> {
        first_non_empty(self.judul.as_deref(), self.title.as_deref())
    }

    /// First non-empty of the private and school description columns.
    pub fn resolved_description(&self) -> Option<String> {
        first_non_empty(self.deskripsi.as_deref(), self.description.as_deref())
    }
}

/// Canonical mission record after schema divergence is absorbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub detail: Option<String>,
    pub image_url: Option<String>,
    pub level_kode: String,
    pub level_id: Option<i64>,
    pub tanggal: NaiveDate,
    pub source: Source,
}

/// Inserts the on-the-fly transformation segment (`f_auto,q_auto`) after
/// the upload-path marker of a Cloudinary URL. Anything else passes
/// through untouched.
pub fn optimize_cloudinary(url: &str) -> String {
    if !url.contains("cloudinary") {
        return url.to_string();
    }
    url.replacen("/upload/", "/upload/f_auto,q_auto/", 1)
}

fn first_non_empty(primary: Option<&str>, fallback: Option<&str>) -> Option<String> {
    primary
        .into_iter()
        .chain(fallback)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Maps one raw session row into the canonical shape. Returns `None`
/// when the material reference is absent, which signals "drop this row"
/// rather than a record with empty fields.
///
/// This is the single place the two source schemas meet; a new source
/// table gets a branch here, never downstream.
pub fn normalize(row: &SessionRow, source: Source) -> Option<Mission> {
    let m = row.materi.as_ref()?;
    Some(Mission {
        id: m.id,
        title: first_non_empty(m.judul.as_deref(), m.title.as_deref()).unwrap_or_default(),
        description: first_non_empty(m.deskripsi.as_deref(), m.description.as_deref()),
        detail: m.detail.clone(),
        image_url: m.image_url.as_deref().map(optimize_cloudinary),
        level_kode: m
            .level_kode
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_LEVEL_KODE)
            .to_string(),
        level_id: m.level_id,
        tanggal: row.tanggal,
        source,
    })
}

/// Merges the two normalized source lists: school results first, stable
/// sort by date descending, then dedup by id keeping the first
/// occurrence. Concatenation order plus sort stability is what makes a
/// school entry win when both sources carry the same material on the
/// same date.
pub fn merge_missions(sekolah: Vec<Mission>, private: Vec<Mission>) -> Vec<Mission> {
    let mut combined = sekolah;
    combined.extend(private);
    combined.sort_by(|a, b| b.tanggal.cmp(&a.tanggal));
    let mut seen = HashSet::with_capacity(combined.len());
    combined.retain(|m| seen.insert(m.id));
    combined
}

const SHORT_MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "Mei", "Jun", "Jul", "Agu", "Sep", "Okt", "Nov", "Des",
];

const LONG_MONTHS: [&str; 12] = [
    "Januari",
    "Februari",
    "Maret",
    "April",
    "Mei",
    "Juni",
    "Juli",
    "Agustus",
    "September",
    "Oktober",
    "November",
    "Desember",
];

/// Card date: two-digit day plus abbreviated Indonesian month ("05 Jan").
pub fn format_date_short(date: NaiveDate) -> String {
    format!("{:02} {}", date.day(), SHORT_MONTHS[date.month0() as usize])
}

/// Overlay date: full Indonesian form ("5 Januari 2026").
pub fn format_date_long(date: NaiveDate) -> String {
    format!(
        "{} {} {}",
        date.day(),
        LONG_MONTHS[date.month0() as usize],
        date.year()
    )
}
