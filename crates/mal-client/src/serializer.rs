//! Item record to update/add request body.
//!
//! Bodies carry only the user-progress half of a record; the catalog id goes
//! in the request URL. Every element the service expects is always present,
//! with an empty body when there is nothing to send.

use chrono::NaiveDate;
use quick_xml::escape::escape;
use shared::{Anime, Manga, Progress};
use std::fmt::{Display, Write};

/// Prefix of every serialized body
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Renders a record as an update/add body
pub trait WireBody {
    fn write_body(&self, out: &mut String);
}

/// Serialize a record into a complete XML document
pub fn serialize<T: WireBody>(record: &T) -> String {
    let mut out = String::with_capacity(512);
    out.push_str(XML_DECLARATION);
    out.push_str("<entry>");
    record.write_body(&mut out);
    out.push_str("</entry>");
    out
}

fn element(out: &mut String, name: &str, body: impl Display) {
    // Writing to a String cannot fail
    let _ = write!(out, "<{name}>{body}</{name}>");
}

fn empty(out: &mut String, name: &str) {
    element(out, name, "");
}

fn text(out: &mut String, name: &str, body: &str) {
    element(out, name, escape(body));
}

/// `YYYY-MM-DD` to `MMDDYYYY`; anything unparsable renders empty
fn wire_date(date: &str) -> String {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|d| d.format("%m%d%Y").to_string())
        .unwrap_or_default()
}

fn tags(progress: &Progress) -> String {
    progress.tags.join("; ")
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

impl WireBody for Anime {
    fn write_body(&self, out: &mut String) {
        let progress = &self.progress;
        element(out, "episode", self.watched_episodes);
        element(out, "status", progress.status.code());
        element(out, "score", progress.score);
        empty(out, "downloaded_episodes");
        empty(out, "storage_type");
        empty(out, "storage_value");
        empty(out, "times_rewatched");
        empty(out, "rewatch_value");
        element(out, "date_start", wire_date(&progress.date_start));
        element(out, "date_finish", wire_date(&progress.date_finish));
        empty(out, "priority");
        empty(out, "enable_discussion");
        element(out, "enable_rewatching", flag(progress.reconsuming));
        empty(out, "comments");
        empty(out, "fansub_group");
        text(out, "tags", &tags(progress));
        element(out, "rewatch_episode", self.rewatch_episode);
    }
}

impl WireBody for Manga {
    fn write_body(&self, out: &mut String) {
        let progress = &self.progress;
        element(out, "chapter", self.read_chapters);
        element(out, "volume", self.read_volumes);
        element(out, "status", progress.status.code());
        element(out, "score", progress.score);
        empty(out, "downloaded_chapters");
        empty(out, "times_reread");
        empty(out, "reread_value");
        element(out, "date_start", wire_date(&progress.date_start));
        element(out, "date_finish", wire_date(&progress.date_finish));
        empty(out, "priority");
        empty(out, "enable_discussion");
        element(out, "enable_rereading", flag(progress.reconsuming));
        empty(out, "comments");
        empty(out, "scan_group");
        text(out, "tags", &tags(progress));
        empty(out, "retail_volumes");
    }
}
