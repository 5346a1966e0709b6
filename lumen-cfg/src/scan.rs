//! Lexical scanners built on [`Source`].
//!
//! None of these fail. Skipping functions return the skipped span, extraction
//! functions return the extracted span and report whether their terminator was
//! found.

use crate::source::{ConsumeNewline, Source};

const LINE_COMMENT_PREFIXES: [&[u8]; 3] = [b"//", b"#", b"--"];
const BLOCK_COMMENT_OPEN: &[u8] = b"/*";
const BLOCK_COMMENT_CLOSE: &[u8] = b"*/";

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

impl<'a> Source<'a> {
    pub fn is_at_whitespace(&self) -> bool {
        self.current_char().is_some_and(|c| c.is_ascii_whitespace())
    }

    pub fn is_at_newline(&self) -> bool {
        self.current_char() == Some(b'\n')
    }

    pub fn skip_whitespace(&mut self, consume_newline: ConsumeNewline) -> Source<'a> {
        let count = self
            .current_bytes()
            .iter()
            .take_while(|&&c| c.is_ascii_whitespace() && (consume_newline == ConsumeNewline::Yes || c != b'\n'))
            .count();
        self.advance_by(count)
    }

    pub fn is_at_line_comment(&self) -> bool {
        let bytes = self.current_bytes();
        LINE_COMMENT_PREFIXES.iter().any(|prefix| bytes.starts_with(prefix))
    }

    pub fn is_at_block_comment(&self) -> bool {
        self.current_bytes().starts_with(BLOCK_COMMENT_OPEN)
    }

    pub fn is_at_comment(&self) -> bool {
        self.is_at_line_comment() || self.is_at_block_comment()
    }

    /// Skip a run of directly adjacent comments.
    ///
    /// A line comment ends right before its newline; the newline itself is
    /// whitespace and left for [`Source::skip_whitespace`]. An unterminated
    /// block comment runs to the end of the input.
    pub fn skip_comments(&mut self) -> Source<'a> {
        let mut source = *self;

        loop {
            let bytes = source.current_bytes();
            if source.is_at_line_comment() {
                let count = bytes.iter().position(|&c| c == b'\n').unwrap_or(bytes.len());
                source.advance_by(count);
            } else if source.is_at_block_comment() {
                let body = &bytes[BLOCK_COMMENT_OPEN.len()..];
                let count = match find(body, BLOCK_COMMENT_CLOSE) {
                    Some(index) => BLOCK_COMMENT_OPEN.len() + index + BLOCK_COMMENT_CLOSE.len(),
                    None => bytes.len(),
                };
                source.advance_by(count);
            } else {
                break;
            }
        }

        let count = source.start.offset - self.start.offset;
        self.advance_by(count)
    }

    /// Interleave whitespace and comment skipping until neither applies.
    pub fn skip_whitespace_and_comments(&mut self, consume_newline: ConsumeNewline) -> Source<'a> {
        let mut source = *self;

        loop {
            if source.is_at_whitespace() {
                if consume_newline == ConsumeNewline::No && source.is_at_newline() {
                    break;
                }
                source.skip_whitespace(consume_newline);
            } else if source.is_at_comment() {
                source.skip_comments();
            } else {
                break;
            }
        }

        let count = source.start.offset - self.start.offset;
        self.advance_by(count)
    }

    /// End of input, `;` or a newline: the natural end of a node's inline clause.
    pub fn is_at_semantic_line_delimiter(&self) -> bool {
        match self.current_char() {
            None => true,
            Some(c) => c == b';' || c == b'\n',
        }
    }

    /// Consume bytes until `predicate` accepts the remaining input, or the input is exhausted.
    pub fn parse_until<P>(&mut self, mut predicate: P) -> Source<'a>
    where
        P: FnMut(&[u8]) -> bool,
    {
        let bytes = self.current_bytes();
        let count = (0..bytes.len())
            .find(|&index| predicate(&bytes[index..]))
            .unwrap_or(bytes.len());
        self.advance_by(count)
    }

    /// Extract the region up to the `close` sequence matching the current nesting `depth`.
    ///
    /// The cursor is expected to sit right after an already consumed `open`
    /// sequence, so `depth` is normally 1. The returned span excludes the
    /// closing sequence, which is consumed if found.
    pub fn parse_nested(&mut self, open: &str, close: &str, mut depth: usize) -> (Source<'a>, bool) {
        let (open, close) = (open.as_bytes(), close.as_bytes());
        let bytes = self.current_bytes();

        let mut count = 0;
        let mut found_closing = false;
        while count < bytes.len() {
            let rest = &bytes[count..];
            if rest.starts_with(open) {
                count += open.len();
                depth += 1;
            } else if rest.starts_with(close) {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    found_closing = true;
                    break;
                }
                count += close.len();
            } else {
                count += 1;
            }
        }

        let region = self.advance_by(count);
        if found_closing {
            self.advance_by(close.len());
        }
        (region, found_closing)
    }

    /// Extract text up to `delimiter`, skipping over any byte that follows `escape`.
    ///
    /// Escapes are not resolved: the escaped byte stays in the returned span
    /// verbatim. With [`ConsumeNewline::No`] a bare newline ends the text as
    /// well. The delimiter is consumed only if it was found.
    pub fn parse_escaped(
        &mut self,
        escape: u8,
        delimiter: &str,
        consume_newline: ConsumeNewline,
    ) -> (Source<'a>, bool) {
        let delimiter = delimiter.as_bytes();
        let bytes = self.current_bytes();

        let mut count = 0;
        let mut found_delimiter = false;
        while count < bytes.len() {
            let rest = &bytes[count..];
            if rest[0] == escape {
                count = (count + 2).min(bytes.len());
            } else if rest.starts_with(delimiter) {
                found_delimiter = true;
                break;
            } else if consume_newline == ConsumeNewline::No && rest[0] == b'\n' {
                break;
            } else {
                count += 1;
            }
        }

        let text = self.advance_by(count);
        if found_delimiter {
            self.advance_by(delimiter.len());
        }
        (text, found_delimiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn skips_single_line_comment() {
        let mut source = Source::new("// hello\nworld");
        let skipped = source.skip_whitespace_and_comments(ConsumeNewline::Yes);

        assert_eq!(skipped.start.offset, 0);
        assert_eq!(skipped.end.offset, 9);
        assert_eq!(source.start.offset, 9);
        assert_eq!(source.end.offset, source.text().len());
    }

    #[test]
    fn skips_many_different_comment_styles() {
        let mut source = Source::new(concat!(
            "// C++ style\n\n",
            "/*\n",
            "C style multiline\n",
            "*/\n\n",
            "/*foo=true*/\n\n",
            "# Shell style\n\n",
            "-- Lua style\n\n",
            "text",
        ));

        let skipped = source.skip_whitespace_and_comments(ConsumeNewline::Yes);
        assert_eq!(skipped.start.offset, 0);
        assert_eq!(skipped.end.offset, 82);
        assert_eq!(source.start.offset, 82);
        assert_eq!(source.current_value(), "text");
    }

    #[test]
    fn line_comment_stops_before_newline_without_consume() {
        let mut source = Source::new("  # note\nnext");
        source.skip_whitespace_and_comments(ConsumeNewline::No);
        assert!(source.is_at_newline());
        assert_eq!(source.start.line, 1);
    }

    #[test]
    fn block_comment_may_span_lines_without_consume() {
        let mut source = Source::new("/* a\nb */ x");
        source.skip_whitespace_and_comments(ConsumeNewline::No);
        assert_eq!(source.current_value(), "x");
        assert_eq!(source.start.line, 2);
    }

    #[test]
    fn unterminated_block_comment_runs_to_end() {
        let mut source = Source::new("/* never closed");
        source.skip_comments();
        assert!(source.is_empty());
    }

    #[test]
    fn whitespace_skip_respects_newline_flag() {
        let mut source = Source::new(" \t\n x");
        source.skip_whitespace(ConsumeNewline::No);
        assert_eq!(source.current_value(), "\n x");

        source.skip_whitespace(ConsumeNewline::Yes);
        assert_eq!(source.current_value(), "x");
    }

    #[rstest]
    #[case("", true)]
    #[case(";", true)]
    #[case("\nfoo", true)]
    #[case(" ;", false)]
    #[case("foo", false)]
    fn semantic_line_delimiter(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(Source::new(text).is_at_semantic_line_delimiter(), expected);
    }

    #[test]
    fn nested_region_is_balanced() {
        let mut source = Source::new("{a{b}c}");
        source.advance_by(1);

        let (region, found) = source.parse_nested("{", "}", 1);
        assert!(found);
        assert_eq!(region.current_value(), "a{b}c");
        assert!(source.is_empty());
    }

    #[test]
    fn nested_region_reports_missing_close() {
        let mut source = Source::new("{a{b}c");
        source.advance_by(1);

        let (region, found) = source.parse_nested("{", "}", 1);
        assert!(!found);
        assert_eq!(region.current_value(), "a{b}c");
        assert!(source.is_empty());
    }

    #[test]
    fn escaped_text_keeps_escapes_verbatim() {
        let mut source = Source::new(r#"say \"hi\"" rest"#);
        let (text, found) = source.parse_escaped(b'\\', "\"", ConsumeNewline::No);

        assert!(found);
        assert_eq!(text.current_value(), r#"say \"hi\""#);
        assert_eq!(source.current_value(), " rest");
    }

    #[test]
    fn escaped_text_stops_at_newline() {
        let mut source = Source::new("abc\ndef\"");
        let (text, found) = source.parse_escaped(b'\\', "\"", ConsumeNewline::No);

        assert!(!found);
        assert_eq!(text.current_value(), "abc");
        assert_eq!(source.current_value(), "\ndef\"");
    }

    #[test]
    fn escaped_text_may_cross_newline() {
        let mut source = Source::new("abc\ndef\" x");
        let (text, found) = source.parse_escaped(b'\\', "\"", ConsumeNewline::Yes);

        assert!(found);
        assert_eq!(text.current_value(), "abc\ndef");
    }

    #[test]
    fn trailing_escape_is_clamped_to_input() {
        let mut source = Source::new("abc\\");
        let (text, found) = source.parse_escaped(b'\\', "\"", ConsumeNewline::No);

        assert!(!found);
        assert_eq!(text.current_value(), "abc\\");
        assert!(source.is_empty());
    }

    #[test]
    fn parse_until_stops_at_predicate() {
        let mut source = Source::new("word rest");
        let word = source.parse_until(|rest| rest[0].is_ascii_whitespace());
        assert_eq!(word.current_value(), "word");
        assert_eq!(source.current_value(), " rest");
    }
}
