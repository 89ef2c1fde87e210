//! In-memory catalog collections.
//!
//! The store holds four collections: the user's current list and the last
//! search results, for each item kind. Each collection has its own lock, so
//! work on one never waits on another.

use shared::{Anime, CatalogItem, Manga};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Year-month prefix of a `YYYY-MM-DD` date
fn season(date: &str) -> &str {
    date.get(..7).unwrap_or(date)
}

/// Record handle ordered newest season first, then by title
///
/// Two records with the same season and title occupy the same slot.
#[derive(Debug)]
struct Ordered<T>(Arc<T>);

impl<T: CatalogItem> Ordered<T> {
    fn key(&self) -> (&str, &str) {
        let series = self.0.series();
        (season(&series.date_begin), &series.title)
    }
}

impl<T: CatalogItem> Ord for Ordered<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        let (season, title) = self.key();
        let (other_season, other_title) = other.key();
        other_season
            .cmp(season)
            .then_with(|| title.cmp(other_title))
    }
}

impl<T: CatalogItem> PartialOrd for Ordered<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: CatalogItem> PartialEq for Ordered<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: CatalogItem> Eq for Ordered<T> {}

/// How a batch is applied to a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// The batch becomes the whole collection
    Replace,
    /// The batch is inserted; records in the same slot are replaced
    Merge,
}

/// Ordered set of records behind its own lock
#[derive(Debug)]
pub struct Collection<T> {
    name: &'static str,
    entries: Mutex<BTreeSet<Ordered<T>>>,
}

impl<T: CatalogItem> Collection<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn entries(&self) -> MutexGuard<'_, BTreeSet<Ordered<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a batch as one step; readers see either the old or the new state
    ///
    /// Returns the collection size afterwards.
    pub fn apply(&self, records: Vec<T>, mode: ApplyMode) -> usize {
        let batch = records.len();
        let len = match mode {
            ApplyMode::Replace => {
                let mut fresh = BTreeSet::new();
                for record in records {
                    fresh.replace(Ordered(Arc::new(record)));
                }
                let mut entries = self.entries();
                *entries = fresh;
                entries.len()
            }
            ApplyMode::Merge => {
                let incoming: Vec<_> = records.into_iter().map(|r| Ordered(Arc::new(r))).collect();
                let mut entries = self.entries();
                for record in incoming {
                    entries.replace(record);
                }
                entries.len()
            }
        };

        debug!(collection = self.name, ?mode, batch, len, "Applied batch");
        len
    }

    /// Visit every record in order while holding the lock
    ///
    /// The visitor must not touch this collection.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&T),
    {
        let entries = self.entries();
        for entry in entries.iter() {
            visitor(&entry.0);
        }
    }

    /// Shared handles to every record, in order
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries().iter().map(|e| Arc::clone(&e.0)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}

/// The four collections kept by the client
#[derive(Debug)]
pub struct CatalogStore {
    pub anime_list: Collection<Anime>,
    pub manga_list: Collection<Manga>,
    pub anime_search: Collection<Anime>,
    pub manga_search: Collection<Manga>,
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self {
            anime_list: Collection::new("anime_list"),
            manga_list: Collection::new("manga_list"),
            anime_search: Collection::new("anime_search"),
            manga_search: Collection::new("manga_search"),
        }
    }
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Picks the collections belonging to an item kind
pub trait Stored: CatalogItem {
    fn list(store: &CatalogStore) -> &Collection<Self>;
    fn search_results(store: &CatalogStore) -> &Collection<Self>;
}

impl Stored for Anime {
    fn list(store: &CatalogStore) -> &Collection<Self> {
        &store.anime_list
    }

    fn search_results(store: &CatalogStore) -> &Collection<Self> {
        &store.anime_search
    }
}

impl Stored for Manga {
    fn list(store: &CatalogStore) -> &Collection<Self> {
        &store.manga_list
    }

    fn search_results(store: &CatalogStore) -> &Collection<Self> {
        &store.manga_search
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn anime(title: &str, date_begin: &str) -> Anime {
        let mut anime = Anime::default();
        anime.series.title = title.to_string();
        anime.series.date_begin = date_begin.to_string();
        anime
    }

    fn titles(collection: &Collection<Anime>) -> Vec<String> {
        let mut titles = Vec::new();
        collection.for_each(|a| titles.push(a.series.title.clone()));
        titles
    }

    #[test]
    fn test_newest_season_first_then_title() {
        let collection = Collection::new("test");
        collection.apply(
            vec![
                anime("Zeta", "2019-10-04"),
                anime("Beta", "2020-04-10"),
                anime("Alpha", "2020-04-01"),
                anime("Gamma", ""),
            ],
            ApplyMode::Replace,
        );

        assert_eq!(titles(&collection), vec!["Alpha", "Beta", "Zeta", "Gamma"]);
    }

    #[test]
    fn test_apply_twice_is_idempotent() {
        let collection = Collection::new("test");
        let batch = vec![anime("Foo", "2020-01-01"), anime("Bar", "2021-07-01")];

        collection.apply(batch.clone(), ApplyMode::Merge);
        let first = titles(&collection);
        collection.apply(batch, ApplyMode::Merge);

        assert_eq!(collection.len(), 2);
        assert_eq!(titles(&collection), first);
    }

    #[test]
    fn test_reinsert_replaces_slot() {
        let collection = Collection::new("test");
        collection.apply(vec![anime("Foo", "2020-01-01")], ApplyMode::Replace);

        let mut updated = anime("Foo", "2020-01-15");
        updated.watched_episodes = 9;
        collection.apply(vec![updated], ApplyMode::Merge);

        let snapshot = collection.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].watched_episodes, 9);
        assert_eq!(snapshot[0].series.date_begin, "2020-01-15");
    }

    #[test]
    fn test_replace_and_clear() {
        let collection = Collection::new("test");
        collection.apply(vec![anime("Foo", "2020-01-01")], ApplyMode::Replace);
        collection.apply(vec![anime("Bar", "2020-01-01")], ApplyMode::Replace);
        assert_eq!(titles(&collection), vec!["Bar"]);

        collection.clear();
        assert!(collection.is_empty());
    }

    #[test]
    fn test_other_collection_not_blocked_during_traversal() {
        let store = Arc::new(CatalogStore::new());
        store
            .anime_list
            .apply(vec![anime("Foo", "2020-01-01")], ApplyMode::Replace);

        let (tx, rx) = mpsc::channel();
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut manga = Manga::default();
                manga.series.title = "Bar".to_string();
                store.manga_search.apply(vec![manga], ApplyMode::Replace);
                store.anime_search.apply(vec![anime("Baz", "")], ApplyMode::Merge);
                tx.send(()).unwrap();
            })
        };

        // The anime list stays locked until the writer reports back
        let mut visited = 0;
        store.anime_list.for_each(|_| {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
            visited += 1;
        });

        writer.join().unwrap();
        assert_eq!(visited, 1);
        assert_eq!(store.manga_search.len(), 1);
    }

    #[test]
    fn test_concurrent_replace_never_interleaves() {
        let first: Vec<Anime> = (0..200).map(|i| anime(&format!("a{i:03}"), "2020-01-01")).collect();
        let second: Vec<Anime> = (0..150).map(|i| anime(&format!("b{i:03}"), "2021-01-01")).collect();
        let expected_first: Vec<String> = first.iter().map(|a| a.series.title.clone()).collect();
        let expected_second: Vec<String> = second.iter().map(|a| a.series.title.clone()).collect();

        for _ in 0..20 {
            let collection = Arc::new(Collection::new("test"));
            let handles: Vec<_> = [first.clone(), second.clone()]
                .into_iter()
                .map(|batch| {
                    let collection = Arc::clone(&collection);
                    thread::spawn(move || collection.apply(batch, ApplyMode::Replace))
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let result = titles(&collection);
            assert!(result == expected_first || result == expected_second);
        }
    }

    #[test]
    fn test_stored_picks_kind_collections() {
        let store = CatalogStore::new();
        <Anime as Stored>::list(&store).apply(vec![anime("Foo", "")], ApplyMode::Merge);
        assert_eq!(store.anime_list.len(), 1);
        assert!(<Manga as Stored>::list(&store).is_empty());
        assert_eq!(<Manga as Stored>::search_results(&store).name(), "manga_search");
    }
}
