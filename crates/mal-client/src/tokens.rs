//! Pull-style token stream over the service's XML.
//!
//! The deserializer consumes plain [`Token`] values so it can be fed from
//! any tokenizer. [`XmlTokens`] is the one used in production, built on
//! `quick-xml`.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// Kind of a token in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    StartElement,
    EndElement,
    Text,
    /// Whitespace-only text between elements
    SignificantWhitespace,
    /// Comments, processing instructions, CDATA and doctype
    Other,
}

/// One token of the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: NodeKind,
    /// Element name for start/end tokens, `#text` for text tokens
    pub name: String,
    pub value: String,
}

impl Token {
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::StartElement,
            name: name.into(),
            value: String::new(),
        }
    }

    pub fn end(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::EndElement,
            name: name.into(),
            value: String::new(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Text,
            name: TEXT_NODE_NAME.to_string(),
            value: value.into(),
        }
    }

    fn whitespace(value: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::SignificantWhitespace,
            name: TEXT_NODE_NAME.to_string(),
            value: value.into(),
        }
    }

    fn other(name: &str, value: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Other,
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// Name carried by text tokens
pub const TEXT_NODE_NAME: &str = "#text";

/// The reader could not continue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadError {
    /// Byte offset where reading stopped
    pub position: u64,
    pub message: String,
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "read failed at byte {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ReadError {}

/// Iterator of tokens over an XML document held in memory
///
/// Yields `Err` at most once; the stream is finished afterwards. Input that
/// ends inside an open element is an error.
pub struct XmlTokens<'a> {
    reader: Reader<&'a [u8]>,
    /// End token owed for a self-closing element
    pending_end: Option<String>,
    /// Elements opened and not yet closed
    depth: usize,
    finished: bool,
}

impl<'a> XmlTokens<'a> {
    pub fn new(xml: &'a str) -> Self {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        Self {
            reader,
            pending_end: None,
            depth: 0,
            finished: false,
        }
    }
}

impl Iterator for XmlTokens<'_> {
    type Item = Result<Token, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(name) = self.pending_end.take() {
            return Some(Ok(Token::end(name)));
        }

        while !self.finished {
            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(ReadError {
                        position: self.reader.error_position() as u64,
                        message: e.to_string(),
                    }));
                }
            };

            let token = match event {
                Event::Start(e) => {
                    self.depth += 1;
                    Token::start(String::from_utf8_lossy(e.name().as_ref()))
                }
                Event::End(e) => {
                    self.depth = self.depth.saturating_sub(1);
                    Token::end(String::from_utf8_lossy(e.name().as_ref()))
                }
                Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    self.pending_end = Some(name.clone());
                    Token::start(name)
                }
                Event::Text(e) => {
                    // HTML-only entities (&mdash; and friends) are not valid
                    // XML; hand them through raw for the text cleaner.
                    let value = match e.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    if value.chars().all(char::is_whitespace) {
                        Token::whitespace(value)
                    } else {
                        Token::text(value)
                    }
                }
                Event::CData(e) => Token::other("#cdata-section", String::from_utf8_lossy(&e)),
                Event::Comment(e) => Token::other("#comment", String::from_utf8_lossy(&e)),
                Event::PI(e) => Token::other("#pi", String::from_utf8_lossy(&e)),
                Event::DocType(e) => Token::other("#doctype", String::from_utf8_lossy(&e)),
                Event::Decl(_) => continue,
                Event::Eof => {
                    self.finished = true;
                    if self.depth > 0 {
                        return Some(Err(ReadError {
                            position: self.reader.buffer_position() as u64,
                            message: format!("input ended with {} open elements", self.depth),
                        }));
                    }
                    return None;
                }
            };

            return Some(Ok(token));
        }

        None
    }
}
