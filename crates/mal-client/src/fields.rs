//! Wire element name to field tag resolution.
//!
//! The list feed (`malappinfo.php`) and the search feed use different names
//! for the same data (`series_title` vs `title`). Both resolve to the same
//! [`FieldTag`], so everything past this table is shape-agnostic.

use shared::ItemKind;
use std::collections::HashMap;

/// Semantic role of a wire element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldTag {
    /// Known element that carries no item data
    Ignore,
    /// Text node
    Text,
    /// Element name not present in the table
    Unmapped,

    // Envelope
    /// Kind-specific wrapper (`anime` / `manga`)
    Item,
    /// Search-result wrapper
    Entry,

    // Descriptive fields
    SeriesId,
    SeriesTitle,
    SeriesType,
    /// Episode or chapter count
    SeriesUnits,
    SeriesVolumes,
    SeriesStatus,
    SeriesDateBegin,
    SeriesDateEnd,
    SeriesImageUrl,
    SeriesSynonyms,
    Synopsis,

    // User-progress fields
    MyId,
    /// Watched episodes or read chapters
    MyConsumedUnits,
    MyReadVolumes,
    MyStartDate,
    MyFinishDate,
    MyScore,
    MyStatus,
    MyReconsuming,
    MyReconsumingUnit,
    MyLastUpdated,
    MyTags,

    UserId,
}

/// Elements shared by both kinds, including the update-body names
const COMMON_FIELDS: &[(&str, FieldTag)] = &[
    ("#text", FieldTag::Text),
    ("entry", FieldTag::Entry),
    ("my_id", FieldTag::MyId),
    ("id", FieldTag::SeriesId),
    ("series_title", FieldTag::SeriesTitle),
    ("title", FieldTag::SeriesTitle),
    ("series_type", FieldTag::SeriesType),
    ("type", FieldTag::SeriesType),
    ("series_status", FieldTag::SeriesStatus),
    ("status", FieldTag::SeriesStatus),
    ("series_start", FieldTag::SeriesDateBegin),
    ("start_date", FieldTag::SeriesDateBegin),
    ("series_end", FieldTag::SeriesDateEnd),
    ("end_date", FieldTag::SeriesDateEnd),
    ("series_image", FieldTag::SeriesImageUrl),
    ("image", FieldTag::SeriesImageUrl),
    ("series_synonyms", FieldTag::SeriesSynonyms),
    ("synonyms", FieldTag::SeriesSynonyms),
    ("english", FieldTag::SeriesSynonyms),
    ("synopsis", FieldTag::Synopsis),
    ("my_score", FieldTag::MyScore),
    ("score", FieldTag::MyScore),
    ("my_start_date", FieldTag::MyStartDate),
    ("date_start", FieldTag::MyStartDate),
    ("my_finish_date", FieldTag::MyFinishDate),
    ("date_finish", FieldTag::MyFinishDate),
    ("my_status", FieldTag::MyStatus),
    ("my_last_updated", FieldTag::MyLastUpdated),
    ("my_tags", FieldTag::MyTags),
    ("tags", FieldTag::MyTags),
    ("user_id", FieldTag::UserId),
    ("user_name", FieldTag::Ignore),
    ("user_completed", FieldTag::Ignore),
    ("user_onhold", FieldTag::Ignore),
    ("user_dropped", FieldTag::Ignore),
    ("user_days_spent_watching", FieldTag::Ignore),
    ("myinfo", FieldTag::Ignore),
    ("myanimelist", FieldTag::Ignore),
    ("priority", FieldTag::Ignore),
    ("enable_discussion", FieldTag::Ignore),
    ("comments", FieldTag::Ignore),
];

const ANIME_FIELDS: &[(&str, FieldTag)] = &[
    ("anime", FieldTag::Item),
    ("series_animedb_id", FieldTag::SeriesId),
    ("series_episodes", FieldTag::SeriesUnits),
    ("episodes", FieldTag::SeriesUnits),
    ("my_watched_episodes", FieldTag::MyConsumedUnits),
    ("episode", FieldTag::MyConsumedUnits),
    ("my_rewatching", FieldTag::MyReconsuming),
    ("enable_rewatching", FieldTag::MyReconsuming),
    ("my_rewatching_ep", FieldTag::MyReconsumingUnit),
    ("rewatch_episode", FieldTag::MyReconsumingUnit),
    ("user_watching", FieldTag::Ignore),
    ("user_plantowatch", FieldTag::Ignore),
    ("downloaded_episodes", FieldTag::Ignore),
    ("storage_type", FieldTag::Ignore),
    ("storage_value", FieldTag::Ignore),
    ("times_rewatched", FieldTag::Ignore),
    ("rewatch_value", FieldTag::Ignore),
    ("fansub_group", FieldTag::Ignore),
];

const MANGA_FIELDS: &[(&str, FieldTag)] = &[
    ("manga", FieldTag::Item),
    ("series_mangadb_id", FieldTag::SeriesId),
    ("series_chapters", FieldTag::SeriesUnits),
    ("chapters", FieldTag::SeriesUnits),
    ("series_volumes", FieldTag::SeriesVolumes),
    ("volumes", FieldTag::SeriesVolumes),
    ("my_read_chapters", FieldTag::MyConsumedUnits),
    ("chapter", FieldTag::MyConsumedUnits),
    ("my_read_volumes", FieldTag::MyReadVolumes),
    ("volume", FieldTag::MyReadVolumes),
    // The service spells it with a double g
    ("my_rereadingg", FieldTag::MyReconsuming),
    ("enable_rereading", FieldTag::MyReconsuming),
    ("my_rereading_chap", FieldTag::MyReconsumingUnit),
    ("user_reading", FieldTag::Ignore),
    ("user_plantoread", FieldTag::Ignore),
    ("downloaded_chapters", FieldTag::Ignore),
    ("times_reread", FieldTag::Ignore),
    ("reread_value", FieldTag::Ignore),
    ("scan_group", FieldTag::Ignore),
    ("retail_volumes", FieldTag::Ignore),
];

/// Immutable element name table for one item kind
///
/// Built once when the client is constructed and shared by reference with
/// the deserializer.
#[derive(Debug, Clone)]
pub struct FieldTable {
    kind: ItemKind,
    names: HashMap<&'static str, FieldTag>,
}

impl FieldTable {
    /// Build the table for an item kind
    pub fn for_kind(kind: ItemKind) -> Self {
        let specific = match kind {
            ItemKind::Anime => ANIME_FIELDS,
            ItemKind::Manga => MANGA_FIELDS,
        };

        let names = COMMON_FIELDS
            .iter()
            .chain(specific.iter())
            .copied()
            .collect();

        Self { kind, names }
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Resolve an element name. Unknown names yield [`FieldTag::Unmapped`].
    pub fn resolve(&self, name: &str) -> FieldTag {
        self.names.get(name).copied().unwrap_or(FieldTag::Unmapped)
    }

    /// Number of known element names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve_to_same_tag() {
        let table = FieldTable::for_kind(ItemKind::Anime);
        assert_eq!(table.resolve("series_title"), table.resolve("title"));
        assert_eq!(table.resolve("series_animedb_id"), FieldTag::SeriesId);
        assert_eq!(table.resolve("id"), FieldTag::SeriesId);
        assert_eq!(table.resolve("english"), FieldTag::SeriesSynonyms);
        assert_eq!(table.resolve("#text"), FieldTag::Text);
    }

    #[test]
    fn test_unknown_name_is_unmapped() {
        let table = FieldTable::for_kind(ItemKind::Anime);
        assert_eq!(table.resolve("xyz_unknown"), FieldTag::Unmapped);
        // Names of the other kind are not known
        assert_eq!(table.resolve("series_mangadb_id"), FieldTag::Unmapped);
        assert_eq!(table.resolve("manga"), FieldTag::Unmapped);
    }

    #[test]
    fn test_manga_table() {
        let table = FieldTable::for_kind(ItemKind::Manga);
        assert_eq!(table.kind(), ItemKind::Manga);
        assert_eq!(table.resolve("manga"), FieldTag::Item);
        assert_eq!(table.resolve("my_rereadingg"), FieldTag::MyReconsuming);
        assert_eq!(table.resolve("series_volumes"), FieldTag::SeriesVolumes);
        assert_eq!(table.resolve("anime"), FieldTag::Unmapped);
    }

    #[test]
    fn test_no_duplicate_names() {
        for kind in [ItemKind::Anime, ItemKind::Manga] {
            let specific = match kind {
                ItemKind::Anime => ANIME_FIELDS,
                ItemKind::Manga => MANGA_FIELDS,
            };
            let table = FieldTable::for_kind(kind);
            assert_eq!(table.len(), COMMON_FIELDS.len() + specific.len());
        }
    }
}
