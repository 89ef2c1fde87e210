//! Data models for catalog items.
//!
//! This module defines the two item kinds served by the catalog (anime and
//! manga), the descriptive and user-progress halves they share, and the wire
//! enumerations carried by both the list and search feeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which catalog an item belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Anime,
    Manga,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Anime => "anime",
            ItemKind::Manga => "manga",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a wire value cannot be parsed into a model field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidValue {
    pub expected: &'static str,
    pub value: String,
}

impl InvalidValue {
    pub fn new(expected: &'static str, value: impl Into<String>) -> Self {
        Self {
            expected,
            value: value.into(),
        }
    }
}

impl std::fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}: {:?}", self.expected, self.value)
    }
}

impl std::error::Error for InvalidValue {}

/// Media format of a series
///
/// The list feed sends numeric codes, the search feed sends labels.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SeriesType {
    #[default]
    Unknown,
    // Anime formats
    Tv,
    Ova,
    Movie,
    Special,
    Ona,
    Music,
    // Manga formats
    Manga,
    Novel,
    OneShot,
    Doujin,
    Manhwa,
    Manhua,
    Oel,
}

impl SeriesType {
    /// Resolve a list-feed numeric code for the given kind
    pub fn from_code(kind: ItemKind, code: u8) -> Option<Self> {
        let ty = match (kind, code) {
            (_, 0) => SeriesType::Unknown,
            (ItemKind::Anime, 1) => SeriesType::Tv,
            (ItemKind::Anime, 2) => SeriesType::Ova,
            (ItemKind::Anime, 3) => SeriesType::Movie,
            (ItemKind::Anime, 4) => SeriesType::Special,
            (ItemKind::Anime, 5) => SeriesType::Ona,
            (ItemKind::Anime, 6) => SeriesType::Music,
            (ItemKind::Manga, 1) => SeriesType::Manga,
            (ItemKind::Manga, 2) => SeriesType::Novel,
            (ItemKind::Manga, 3) => SeriesType::OneShot,
            (ItemKind::Manga, 4) => SeriesType::Doujin,
            (ItemKind::Manga, 5) => SeriesType::Manhwa,
            (ItemKind::Manga, 6) => SeriesType::Manhua,
            (ItemKind::Manga, 7) => SeriesType::Oel,
            _ => return None,
        };
        Some(ty)
    }

    /// Parse either a numeric code or a label
    pub fn parse(kind: ItemKind, value: &str) -> Result<Self, InvalidValue> {
        let value = value.trim();
        if let Ok(code) = value.parse::<u8>() {
            return Self::from_code(kind, code).ok_or_else(|| InvalidValue::new("series type", value));
        }
        match value.to_ascii_lowercase().as_str() {
            "tv" => Ok(SeriesType::Tv),
            "ova" => Ok(SeriesType::Ova),
            "movie" => Ok(SeriesType::Movie),
            "special" => Ok(SeriesType::Special),
            "ona" => Ok(SeriesType::Ona),
            "music" => Ok(SeriesType::Music),
            "manga" => Ok(SeriesType::Manga),
            "novel" | "light novel" => Ok(SeriesType::Novel),
            "one shot" | "one-shot" => Ok(SeriesType::OneShot),
            "doujin" | "doujinshi" => Ok(SeriesType::Doujin),
            "manhwa" => Ok(SeriesType::Manhwa),
            "manhua" => Ok(SeriesType::Manhua),
            "oel" => Ok(SeriesType::Oel),
            _ => Err(InvalidValue::new("series type", value)),
        }
    }
}

impl std::fmt::Display for SeriesType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SeriesType::Unknown => "Unknown",
            SeriesType::Tv => "TV",
            SeriesType::Ova => "OVA",
            SeriesType::Movie => "Movie",
            SeriesType::Special => "Special",
            SeriesType::Ona => "ONA",
            SeriesType::Music => "Music",
            SeriesType::Manga => "Manga",
            SeriesType::Novel => "Novel",
            SeriesType::OneShot => "One Shot",
            SeriesType::Doujin => "Doujin",
            SeriesType::Manhwa => "Manhwa",
            SeriesType::Manhua => "Manhua",
            SeriesType::Oel => "OEL",
        };
        f.write_str(label)
    }
}

/// Airing or publishing status of a series
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStatus {
    #[default]
    Unknown,
    /// Currently airing / publishing
    Ongoing,
    Finished,
    /// Not yet aired / published
    Upcoming,
}

impl SeriesStatus {
    pub fn label(&self, kind: ItemKind) -> &'static str {
        match (self, kind) {
            (SeriesStatus::Unknown, _) => "Unknown",
            (SeriesStatus::Ongoing, ItemKind::Anime) => "Currently Airing",
            (SeriesStatus::Ongoing, ItemKind::Manga) => "Publishing",
            (SeriesStatus::Finished, ItemKind::Anime) => "Finished Airing",
            (SeriesStatus::Finished, ItemKind::Manga) => "Finished",
            (SeriesStatus::Upcoming, ItemKind::Anime) => "Not yet aired",
            (SeriesStatus::Upcoming, ItemKind::Manga) => "Not yet published",
        }
    }
}

impl std::str::FromStr for SeriesStatus {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" => Ok(SeriesStatus::Unknown),
            "1" | "currently airing" | "publishing" => Ok(SeriesStatus::Ongoing),
            "2" | "finished airing" | "finished" => Ok(SeriesStatus::Finished),
            "3" | "not yet aired" | "not yet published" => Ok(SeriesStatus::Upcoming),
            _ => Err(InvalidValue::new("series status", s)),
        }
    }
}

/// The user's own status for a list entry
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Invalid,
    /// Watching / reading
    InProgress,
    Completed,
    OnHold,
    Dropped,
    /// Plan to watch / plan to read
    Planned,
}

impl UserStatus {
    /// Numeric code used by the list feed and by update bodies
    pub fn code(&self) -> u8 {
        match self {
            UserStatus::Invalid => 0,
            UserStatus::InProgress => 1,
            UserStatus::Completed => 2,
            UserStatus::OnHold => 3,
            UserStatus::Dropped => 4,
            UserStatus::Planned => 6,
        }
    }

    pub fn label(&self, kind: ItemKind) -> &'static str {
        match (self, kind) {
            (UserStatus::Invalid, _) => "Invalid",
            (UserStatus::InProgress, ItemKind::Anime) => "Watching",
            (UserStatus::InProgress, ItemKind::Manga) => "Reading",
            (UserStatus::Completed, _) => "Completed",
            (UserStatus::OnHold, _) => "On Hold",
            (UserStatus::Dropped, _) => "Dropped",
            (UserStatus::Planned, ItemKind::Anime) => "Plan To Watch",
            (UserStatus::Planned, ItemKind::Manga) => "Plan To Read",
        }
    }
}

impl std::str::FromStr for UserStatus {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "0" => Ok(UserStatus::Invalid),
            "1" | "watching" | "reading" => Ok(UserStatus::InProgress),
            "2" | "completed" => Ok(UserStatus::Completed),
            "3" | "onhold" => Ok(UserStatus::OnHold),
            "4" | "dropped" => Ok(UserStatus::Dropped),
            "6" | "plantowatch" | "plantoread" => Ok(UserStatus::Planned),
            _ => Err(InvalidValue::new("user status", s)),
        }
    }
}

/// Descriptive half of a catalog item
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Series {
    id: Option<u64>,
    pub title: String,
    pub synonyms: Vec<String>,
    pub series_type: SeriesType,
    pub status: SeriesStatus,
    /// Raw start date as sent by the service (`YYYY-MM-DD`, may be `0000-00-00`)
    pub date_begin: String,
    pub date_end: String,
    pub image_url: String,
    pub synopsis: String,
}

impl Series {
    /// Catalog id of the series
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Set the catalog id. Write-once: returns false and keeps the existing
    /// id if one was already assigned.
    pub fn assign_id(&mut self, id: u64) -> bool {
        match self.id {
            Some(existing) => existing == id,
            None => {
                self.id = Some(id);
                true
            }
        }
    }
}

/// User-progress half of a catalog item
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Progress {
    list_id: Option<u64>,
    pub status: UserStatus,
    pub score: f32,
    pub date_start: String,
    pub date_finish: String,
    /// Re-watching / re-reading flag
    pub reconsuming: bool,
    pub tags: Vec<String>,
    /// Unix timestamp of the last change on the service side
    pub last_updated: i64,
}

impl Progress {
    /// User-list id of the entry
    pub fn list_id(&self) -> Option<u64> {
        self.list_id
    }

    /// Set the user-list id. Write-once, see [`Series::assign_id`].
    pub fn assign_list_id(&mut self, id: u64) -> bool {
        match self.list_id {
            Some(existing) => existing == id,
            None => {
                self.list_id = Some(id);
                true
            }
        }
    }

    /// `last_updated` as a UTC time; `None` when never updated
    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        if self.last_updated <= 0 {
            return None;
        }
        DateTime::from_timestamp(self.last_updated, 0)
    }
}

/// Episodic catalog item
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Anime {
    pub series: Series,
    pub progress: Progress,
    /// Total episode count (0 when unknown)
    pub episodes: u32,
    pub watched_episodes: u32,
    pub rewatch_episode: u32,
}

/// Chaptered catalog item
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Manga {
    pub series: Series,
    pub progress: Progress,
    /// Total chapter count (0 when unknown)
    pub chapters: u32,
    pub volumes: u32,
    pub read_chapters: u32,
    pub read_volumes: u32,
    pub reread_chapter: u32,
}

/// Common access to both item kinds
pub trait CatalogItem: Clone + Default + Send + Sync + 'static {
    const KIND: ItemKind;

    fn series(&self) -> &Series;
    fn series_mut(&mut self) -> &mut Series;
    fn progress(&self) -> &Progress;
    fn progress_mut(&mut self) -> &mut Progress;
}

impl CatalogItem for Anime {
    const KIND: ItemKind = ItemKind::Anime;

    fn series(&self) -> &Series {
        &self.series
    }
    fn series_mut(&mut self) -> &mut Series {
        &mut self.series
    }
    fn progress(&self) -> &Progress {
        &self.progress
    }
    fn progress_mut(&mut self) -> &mut Progress {
        &mut self.progress
    }
}

impl CatalogItem for Manga {
    const KIND: ItemKind = ItemKind::Manga;

    fn series(&self) -> &Series {
        &self.series
    }
    fn series_mut(&mut self) -> &mut Series {
        &mut self.series
    }
    fn progress(&self) -> &Progress {
        &self.progress
    }
    fn progress_mut(&mut self) -> &mut Progress {
        &mut self.progress
    }
}
