//! Token stream to item records.
//!
//! Handles both envelopes the service sends:
//!
//! ```text
//! list feed:     <myanimelist><anime>..</anime><anime>..</anime></myanimelist>
//! search feed:   <anime><entry>..</entry><entry>..</entry></anime>
//! ```
//!
//! Which element closes a record is decided by [`Envelope`] from the order
//! in which the kind wrapper and `entry` first open. Parsing is best-effort:
//! anomalies are collected as [`Diagnostic`]s and never abort the pass. Only a
//! matched end element finalizes a record, so a truncated stream drops the
//! record it was building.

use crate::fields::{FieldTable, FieldTag};
use crate::text::TextCleaner;
use crate::tokens::{NodeKind, ReadError, Token, XmlTokens};
use chrono::NaiveDate;
use shared::{Anime, CatalogItem, InvalidValue, Manga, SeriesType};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Field setter: parses wire text into one field of the accumulator
pub type Setter<T> = fn(&mut T, String) -> Result<(), InvalidValue>;

/// Tag to setter dispatch for an item kind
pub trait FieldSetters: CatalogItem {
    /// Setter for a tag, or `None` for tags that carry no data for this kind
    fn setter(tag: FieldTag) -> Option<Setter<Self>>;
}

/// Non-fatal anomaly met while deserializing
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Element name missing from the field table
    UnknownElement { name: String },
    /// Text that does not sit directly inside an element
    TextOutsideElement { text: String },
    /// Text node that was empty after cleaning
    EmptyText { field: FieldTag },
    /// Setter rejected the text; the field keeps its previous value
    InvalidValue { field: FieldTag, error: InvalidValue },
    /// Comment, CDATA, processing instruction or doctype
    UnexpectedNode { name: String, value: String },
    /// The tokenizer gave up; later records are lost
    ReadFailure(ReadError),
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::UnknownElement { name } => write!(f, "unexpected field {name}"),
            Diagnostic::TextOutsideElement { text } => {
                write!(f, "text outside of a field: {text:?}")
            }
            Diagnostic::EmptyText { field } => write!(f, "empty text for {field:?}"),
            Diagnostic::InvalidValue { field, error } => write!(f, "{field:?}: {error}"),
            Diagnostic::UnexpectedNode { name, value } => {
                write!(f, "unexpected node {name} = {value:?}")
            }
            Diagnostic::ReadFailure(error) => write!(f, "{error}"),
        }
    }
}

/// Records finalized by one pass, with what went wrong along the way
#[derive(Debug, Clone)]
pub struct Deserialized<T> {
    pub records: Vec<T>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Deserialized<T> {
    /// True if the tokenizer stopped before the end of input
    pub fn read_failed(&self) -> bool {
        self.read_error().is_some()
    }

    pub fn read_error(&self) -> Option<&ReadError> {
        self.diagnostics.iter().find_map(|d| match d {
            Diagnostic::ReadFailure(error) => Some(error),
            _ => None,
        })
    }

    /// Emit every diagnostic as a warning
    pub fn log_diagnostics(&self, context: &str) {
        for diagnostic in &self.diagnostics {
            warn!(context = context, "{}", diagnostic);
        }
    }
}

/// Which element closes a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Envelope {
    /// No wrapper seen yet
    AwaitingShape,
    /// Kind wrapper opened first; it closes records unless an `entry`
    /// opens inside it
    ItemFirst,
    /// Shape known; records close on this tag
    Decided(FieldTag),
}

impl Envelope {
    fn on_start(self, tag: FieldTag) -> Self {
        match (self, tag) {
            (Envelope::AwaitingShape, FieldTag::Item) => Envelope::ItemFirst,
            (Envelope::AwaitingShape, FieldTag::Entry) => Envelope::Decided(FieldTag::Item),
            (Envelope::ItemFirst, FieldTag::Entry) => Envelope::Decided(FieldTag::Entry),
            (state, _) => state,
        }
    }

    fn boundary(self) -> FieldTag {
        match self {
            Envelope::Decided(tag) => tag,
            Envelope::AwaitingShape | Envelope::ItemFirst => FieldTag::Item,
        }
    }

    /// Returns the next state and whether this end element closes a record
    fn on_end(self, tag: FieldTag) -> (Self, bool) {
        let closes = tag == self.boundary();
        let next = match self {
            Envelope::ItemFirst if closes => Envelope::Decided(FieldTag::Item),
            state => state,
        };
        (next, closes)
    }
}

/// Deserializer for one item kind
pub struct ItemDeserializer<T> {
    fields: FieldTable,
    cleaner: Arc<dyn TextCleaner>,
    _item: PhantomData<fn() -> T>,
}

impl<T: FieldSetters> ItemDeserializer<T> {
    pub fn new(cleaner: Arc<dyn TextCleaner>) -> Self {
        Self::with_fields(FieldTable::for_kind(T::KIND), cleaner)
    }

    pub fn with_fields(fields: FieldTable, cleaner: Arc<dyn TextCleaner>) -> Self {
        Self {
            fields,
            cleaner,
            _item: PhantomData,
        }
    }

    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    /// Tokenize and deserialize an XML document
    pub fn deserialize_str(&self, xml: &str) -> Deserialized<T> {
        self.deserialize(XmlTokens::new(xml))
    }

    /// Deserialize a token stream
    pub fn deserialize<I>(&self, tokens: I) -> Deserialized<T>
    where
        I: IntoIterator<Item = Result<Token, ReadError>>,
    {
        let mut records = Vec::new();
        let mut diagnostics = Vec::new();

        let mut item = T::default();
        let mut envelope = Envelope::AwaitingShape;
        // Tag of the innermost open element, cleared on every end element
        let mut field: Option<FieldTag> = None;

        for token in tokens {
            let token = match token {
                Ok(token) => token,
                Err(e) => {
                    diagnostics.push(Diagnostic::ReadFailure(e));
                    break;
                }
            };
            let value = self.cleaner.clean(token.value);

            match token.kind {
                NodeKind::StartElement => {
                    let tag = self.fields.resolve(&token.name);
                    if tag == FieldTag::Unmapped {
                        diagnostics.push(Diagnostic::UnknownElement { name: token.name });
                    }
                    envelope = envelope.on_start(tag);
                    field = Some(tag);
                }
                NodeKind::EndElement => {
                    let tag = self.fields.resolve(&token.name);
                    let (next, closes) = envelope.on_end(tag);
                    envelope = next;
                    if closes {
                        records.push(std::mem::take(&mut item));
                    }
                    field = None;
                }
                NodeKind::Text => {
                    let Some(tag) = field else {
                        diagnostics.push(Diagnostic::TextOutsideElement { text: value });
                        continue;
                    };
                    if value.is_empty() {
                        diagnostics.push(Diagnostic::EmptyText { field: tag });
                        continue;
                    }
                    if let Some(setter) = T::setter(tag) {
                        if let Err(error) = setter(&mut item, value) {
                            diagnostics.push(Diagnostic::InvalidValue { field: tag, error });
                        }
                    }
                }
                NodeKind::SignificantWhitespace => {}
                NodeKind::Other => {
                    diagnostics.push(Diagnostic::UnexpectedNode {
                        name: token.name,
                        value,
                    });
                }
            }
        }

        debug!(
            kind = %T::KIND,
            records = records.len(),
            diagnostics = diagnostics.len(),
            "Deserialized items"
        );

        Deserialized {
            records,
            diagnostics,
        }
    }
}

fn parse_number<N: std::str::FromStr>(value: &str, expected: &'static str) -> Result<N, InvalidValue> {
    value
        .trim()
        .parse()
        .map_err(|_| InvalidValue::new(expected, value))
}

fn parse_flag(value: &str) -> Result<bool, InvalidValue> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(InvalidValue::new("flag", value)),
    }
}

/// Keep `YYYY-MM-DD` as sent; rewrite update-body `MMDDYYYY` to it
fn normalize_date(value: String) -> String {
    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(date) = NaiveDate::parse_from_str(&value, "%m%d%Y") {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    value
}

fn split_list<'a>(
    value: &'a str,
    separators: &'static [char],
) -> impl Iterator<Item = String> + 'a {
    value
        .split(separators)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
}

// Setters shared by both kinds

fn set_series_id<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    let id = parse_number(&value, "catalog id")?;
    if item.series_mut().assign_id(id) {
        Ok(())
    } else {
        Err(InvalidValue::new("catalog id (already assigned)", value))
    }
}

fn set_title<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    item.series_mut().title = value;
    Ok(())
}

fn set_series_type<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    item.series_mut().series_type = SeriesType::parse(T::KIND, &value)?;
    Ok(())
}

fn set_series_status<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    item.series_mut().status = value.parse()?;
    Ok(())
}

fn set_date_begin<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    item.series_mut().date_begin = value;
    Ok(())
}

fn set_date_end<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    item.series_mut().date_end = value;
    Ok(())
}

fn set_image_url<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    item.series_mut().image_url = value;
    Ok(())
}

fn add_synonyms<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    let synonyms = &mut item.series_mut().synonyms;
    for synonym in split_list(&value, &[';']) {
        if !synonyms.contains(&synonym) {
            synonyms.push(synonym);
        }
    }
    Ok(())
}

fn set_synopsis<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    item.series_mut().synopsis = value;
    Ok(())
}

fn set_list_id<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    let id = parse_number(&value, "list id")?;
    if item.progress_mut().assign_list_id(id) {
        Ok(())
    } else {
        Err(InvalidValue::new("list id (already assigned)", value))
    }
}

fn set_score<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    item.progress_mut().score = parse_number(&value, "score")?;
    Ok(())
}

fn set_user_status<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    item.progress_mut().status = value.parse()?;
    Ok(())
}

fn set_date_start<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    item.progress_mut().date_start = normalize_date(value);
    Ok(())
}

fn set_date_finish<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    item.progress_mut().date_finish = normalize_date(value);
    Ok(())
}

fn set_reconsuming<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    item.progress_mut().reconsuming = parse_flag(&value)?;
    Ok(())
}

fn set_tags<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    // Update bodies join with "; ", list feeds with ","
    let separators: &'static [char] = if value.contains(';') { &[';'] } else { &[','] };
    item.progress_mut().tags = split_list(&value, separators).collect();
    Ok(())
}

fn set_last_updated<T: CatalogItem>(item: &mut T, value: String) -> Result<(), InvalidValue> {
    item.progress_mut().last_updated = parse_number(&value, "timestamp")?;
    Ok(())
}

fn common_setter<T: CatalogItem>(tag: FieldTag) -> Option<Setter<T>> {
    let setter: Setter<T> = match tag {
        FieldTag::SeriesId => set_series_id::<T>,
        FieldTag::SeriesTitle => set_title::<T>,
        FieldTag::SeriesType => set_series_type::<T>,
        FieldTag::SeriesStatus => set_series_status::<T>,
        FieldTag::SeriesDateBegin => set_date_begin::<T>,
        FieldTag::SeriesDateEnd => set_date_end::<T>,
        FieldTag::SeriesImageUrl => set_image_url::<T>,
        FieldTag::SeriesSynonyms => add_synonyms::<T>,
        FieldTag::Synopsis => set_synopsis::<T>,
        FieldTag::MyId => set_list_id::<T>,
        FieldTag::MyScore => set_score::<T>,
        FieldTag::MyStatus => set_user_status::<T>,
        FieldTag::MyStartDate => set_date_start::<T>,
        FieldTag::MyFinishDate => set_date_finish::<T>,
        FieldTag::MyReconsuming => set_reconsuming::<T>,
        FieldTag::MyTags => set_tags::<T>,
        FieldTag::MyLastUpdated => set_last_updated::<T>,
        _ => return None,
    };
    Some(setter)
}

// Anime

fn set_episodes(anime: &mut Anime, value: String) -> Result<(), InvalidValue> {
    anime.episodes = parse_number(&value, "episode count")?;
    Ok(())
}

fn set_watched_episodes(anime: &mut Anime, value: String) -> Result<(), InvalidValue> {
    anime.watched_episodes = parse_number(&value, "watched episodes")?;
    Ok(())
}

fn set_rewatch_episode(anime: &mut Anime, value: String) -> Result<(), InvalidValue> {
    anime.rewatch_episode = parse_number(&value, "rewatch episode")?;
    Ok(())
}

impl FieldSetters for Anime {
    fn setter(tag: FieldTag) -> Option<Setter<Self>> {
        let setter: Setter<Self> = match tag {
            FieldTag::SeriesUnits => set_episodes,
            FieldTag::MyConsumedUnits => set_watched_episodes,
            FieldTag::MyReconsumingUnit => set_rewatch_episode,
            _ => return common_setter(tag),
        };
        Some(setter)
    }
}

// Manga

fn set_chapters(manga: &mut Manga, value: String) -> Result<(), InvalidValue> {
    manga.chapters = parse_number(&value, "chapter count")?;
    Ok(())
}

fn set_volumes(manga: &mut Manga, value: String) -> Result<(), InvalidValue> {
    manga.volumes = parse_number(&value, "volume count")?;
    Ok(())
}

fn set_read_chapters(manga: &mut Manga, value: String) -> Result<(), InvalidValue> {
    manga.read_chapters = parse_number(&value, "read chapters")?;
    Ok(())
}

fn set_read_volumes(manga: &mut Manga, value: String) -> Result<(), InvalidValue> {
    manga.read_volumes = parse_number(&value, "read volumes")?;
    Ok(())
}

fn set_reread_chapter(manga: &mut Manga, value: String) -> Result<(), InvalidValue> {
    manga.reread_chapter = parse_number(&value, "reread chapter")?;
    Ok(())
}

impl FieldSetters for Manga {
    fn setter(tag: FieldTag) -> Option<Setter<Self>> {
        let setter: Setter<Self> = match tag {
            FieldTag::SeriesUnits => set_chapters,
            FieldTag::SeriesVolumes => set_volumes,
            FieldTag::MyConsumedUnits => set_read_chapters,
            FieldTag::MyReadVolumes => set_read_volumes,
            FieldTag::MyReconsumingUnit => set_reread_chapter,
            _ => return common_setter(tag),
        };
        Some(setter)
    }
}
