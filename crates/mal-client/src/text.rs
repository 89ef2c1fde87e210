//! Injected text normalization.
//!
//! The service embeds HTML entities and markup in free text. Cleaning them
//! up is the host's business; the deserializer only needs a function to run
//! every token value through.

/// Cleans token text before it reaches a field setter
///
/// Implementations must be idempotent and must not turn non-empty text into
/// empty text.
pub trait TextCleaner: Send + Sync {
    fn clean(&self, text: String) -> String;
}

/// Leaves text untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl TextCleaner for Verbatim {
    fn clean(&self, text: String) -> String {
        text
    }
}

impl<F> TextCleaner for F
where
    F: Fn(String) -> String + Send + Sync,
{
    fn clean(&self, text: String) -> String {
        self(text)
    }
}
