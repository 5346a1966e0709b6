//! Source cursor over an immutable text buffer.
//!
//! A [`Source`] is both the "remaining input" cursor the parser advances and
//! the "consumed span" every primitive hands back. Positions are tracked in
//! bytes; the grammar only ever stops on ASCII bytes.

use std::fmt;

/// A position inside the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// 1-based.
    pub line: usize,
    /// 1-based.
    pub column: usize,
    /// 0-based byte offset.
    pub offset: usize,
}

impl SourceLocation {
    pub const fn start() -> Self {
        Self { line: 1, column: 1, offset: 0 }
    }

    /// The location reached after stepping over `bytes` from here.
    pub fn advanced_over(mut self, bytes: &[u8]) -> Self {
        for &byte in bytes {
            if byte == b'\n' {
                self.column = 1;
                self.line += 1;
            } else {
                self.column += 1;
            }
        }
        self.offset += bytes.len();
        self
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.line, self.column)
    }
}

/// Whether a skipping operation may step over a newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeNewline {
    No,
    Yes,
}

/// A span of source text. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source<'a> {
    text: &'a str,
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl<'a> Source<'a> {
    /// Wrap the whole text, starting at line 1, column 1.
    pub fn new(text: &'a str) -> Self {
        Self::with_start(text, SourceLocation::start())
    }

    /// Wrap the text from an arbitrary starting location up to its end.
    pub fn with_start(text: &'a str, start: SourceLocation) -> Self {
        assert!(start.offset <= text.len(), "start offset out of bounds");
        let end = start.advanced_over(&text.as_bytes()[start.offset..]);
        Self { text, start, end }
    }

    /// The complete underlying text, independent of this span.
    #[inline]
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// The not yet consumed part of this span.
    #[inline]
    pub fn current_value(&self) -> &'a str {
        &self.text[self.start.offset..self.end.offset]
    }

    #[inline]
    pub(crate) fn current_bytes(&self) -> &'a [u8] {
        &self.text.as_bytes()[self.start.offset..self.end.offset]
    }

    /// The first remaining byte, if any.
    #[inline]
    pub fn current_char(&self) -> Option<u8> {
        self.current_bytes().first().copied()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.end.offset - self.start.offset
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Advance the cursor by `n` bytes and return the consumed span.
    ///
    /// # Panics
    /// If `n` exceeds the remaining length.
    pub fn advance_by(&mut self, n: usize) -> Source<'a> {
        assert!(n <= self.remaining(), "cannot advance by {n}, only {} bytes left", self.remaining());

        let mut consumed = *self;
        let bytes = &self.text.as_bytes()[self.start.offset..self.start.offset + n];
        self.start = self.start.advanced_over(bytes);

        consumed.end = self.start;
        consumed
    }

    /// Move this cursor to the position of `other`, which must lie within the same text.
    pub(crate) fn commit(&mut self, other: &Source<'a>) {
        debug_assert!(std::ptr::eq(self.text, other.text));
        debug_assert!(other.start.offset >= self.start.offset);
        self.start = other.start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_tracks_lines_and_columns() {
        let mut source = Source::new("ab\ncd");
        let consumed = source.advance_by(4);

        assert_eq!(consumed.current_value(), "ab\nc");
        assert_eq!(consumed.start, SourceLocation { line: 1, column: 1, offset: 0 });
        assert_eq!(source.start, SourceLocation { line: 2, column: 2, offset: 4 });
        assert_eq!(source.current_value(), "d");
    }

    #[test]
    fn advance_by_zero_is_empty_span() {
        let mut source = Source::new("abc");
        let consumed = source.advance_by(0);
        assert_eq!(consumed.current_value(), "");
        assert_eq!(source.start.offset, 0);
    }

    #[test]
    #[should_panic]
    fn advance_past_end_panics() {
        let mut source = Source::new("abc");
        source.advance_by(4);
    }

    #[test]
    fn with_start_uses_given_offset() {
        let source = Source::with_start("// hello", SourceLocation { line: 1, column: 1, offset: 3 });
        assert_eq!(source.current_value(), "hello");
    }

    #[test]
    fn fresh_span_ends_at_real_position() {
        let source = Source::new("ab\ncde");
        assert_eq!(source.end, SourceLocation { line: 2, column: 4, offset: 6 });

        let mut cursor = source;
        cursor.advance_by(source.remaining());
        assert_eq!(cursor.start, source.end);
    }
}
