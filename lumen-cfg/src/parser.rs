//! Recursive-descent parser for Cfg text.
//!
//! ```text
//! document     := inner_nodes
//! inner_nodes  := node node*
//! node         := [identifier] value* attribute* ["{" inner_nodes? "}"]
//! value        := "..." | `...` | [...] | word
//! attribute    := identifier "=" value
//! ```
//!
//! Each rule works on a copy of the cursor and only commits it on success.
//! A rule that simply does not match returns `Ok(None)`; malformed input is
//! reported as a [`Diagnostic`] and aborts the whole document.

use std::fmt;

use lumen_core::log::{debug, error, warn};

use crate::document::{Attribute, Attributes, Document, Identifier, Literal, NodeAccessMut, NodeHandle, Values};
use crate::source::{ConsumeNewline, Source, SourceLocation};

pub const DEFAULT_MAX_DEPTH: usize = 64;

/// A problem found in the parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub location: SourceLocation,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}): {}", self.location, self.message)
    }
}

/// Options and collected diagnostics of one or more parse calls.
#[derive(Debug, Clone)]
pub struct ParsingContext {
    /// Prefix of every diagnostic, usually the file path.
    pub origin: String,
    /// Deepest allowed `{}` nesting below a top-level node.
    pub max_depth: usize,
    diagnostics: Vec<Diagnostic>,
}

impl ParsingContext {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            max_depth: DEFAULT_MAX_DEPTH,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn report(&mut self, location: SourceLocation, message: impl Into<String>) -> Diagnostic {
        let diagnostic = Diagnostic { location, message: message.into() };
        warn!("{}{}", self.origin, diagnostic);
        self.diagnostics.push(diagnostic.clone());
        diagnostic
    }
}

impl Default for ParsingContext {
    fn default() -> Self {
        Self::new("<memory>")
    }
}

#[derive(Debug)]
pub enum CfgError {
    /// The text holds no node at all.
    Empty { origin: String },
    /// The text is malformed.
    Parse { origin: String, diagnostic: Diagnostic },
    /// The document was still being accessed when parsing started.
    Busy { origin: String, message: String },
}

impl fmt::Display for CfgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CfgError::Empty { origin } => write!(f, "{}: document contains no nodes", origin),
            CfgError::Parse { origin, diagnostic } => write!(f, "{}{}", origin, diagnostic),
            CfgError::Busy { origin, message } => write!(f, "{}: {}", origin, message),
        }
    }
}

impl std::error::Error for CfgError {}

type ParseResult<T> = Result<T, Diagnostic>;

enum LiteralMatch<'a> {
    Found(Literal<'a>),
    Absent,
    /// A word that is neither a number nor a boolean. Not consumed.
    Unparseable(SourceLocation),
}

/// Parse `text` into a fresh document.
pub fn parse<'a>(text: &'a str, context: &mut ParsingContext) -> Result<Document<'a>, CfgError> {
    let document = Document::new();
    parse_document(&document, text, context)?;
    Ok(document)
}

/// Parse `text` and append its top-level nodes to the root of `document`.
///
/// Returns the first appended node. On failure every node created by this
/// call is removed again and the document is left as it was.
#[profiling::function]
pub fn parse_document<'a>(
    document: &Document<'a>,
    text: &'a str,
    context: &mut ParsingContext,
) -> Result<NodeHandle, CfgError> {
    if document.outstanding_accesses() != 0 {
        let message = format!(
            "Cannot parse into a document with {} open node access(es)",
            document.outstanding_accesses()
        );
        error!("{}: {}", context.origin, message);
        return Err(CfgError::Busy { origin: context.origin.clone(), message });
    }

    let rollback_len = document.node_count();
    let root = document.root();
    let existing_last = document.root_children().last();
    let mut source = Source::new(text);

    let mut parser = Parser { document, context };
    let result = parser
        .parse_inner_nodes(&mut source, root, 0)
        .and_then(|first| match first {
            Some(first) => parser.append_to_root(existing_last, first).map(|()| Some(first)),
            None => Ok(None),
        });

    match result {
        Ok(Some(first)) => {
            debug!(
                "{}: parsed {} node(s)",
                context.origin,
                document.node_count() - rollback_len
            );
            Ok(first)
        }
        Ok(None) => {
            document.truncate(rollback_len);
            Err(CfgError::Empty { origin: context.origin.clone() })
        }
        Err(diagnostic) => {
            document.truncate(rollback_len);
            Err(CfgError::Parse { origin: context.origin.clone(), diagnostic })
        }
    }
}

/// A single identifier, with leading whitespace and comments on the same line skipped.
pub(crate) fn parse_identifier<'a>(outer: &mut Source<'a>) -> Option<Identifier<'a>> {
    let mut source = *outer;
    source.skip_whitespace_and_comments(ConsumeNewline::No);

    let first = source.current_char()?;
    if source.is_at_semantic_line_delimiter() || !Identifier::is_valid_first_char(first) {
        return None;
    }

    let count = 1 + source.current_bytes()[1..]
        .iter()
        .take_while(|&&c| Identifier::is_valid_middle_char(c))
        .count();
    let span = source.advance_by(count);

    outer.commit(&source);
    Some(Identifier::new(span.current_value()))
}

pub(crate) fn parse_name<'a>(source: &mut Source<'a>) -> Option<Identifier<'a>> {
    parse_identifier(source)
}

struct Parser<'d, 'a, 'c> {
    document: &'d Document<'a>,
    context: &'c mut ParsingContext,
}

impl<'d, 'a> Parser<'d, 'a, '_> {
    fn parse_literal(&mut self, outer: &mut Source<'a>) -> ParseResult<LiteralMatch<'a>> {
        let mut source = *outer;
        source.skip_whitespace_and_comments(ConsumeNewline::No);
        if source.is_at_semantic_line_delimiter() {
            return Ok(LiteralMatch::Absent);
        }

        let location = source.start;
        let literal = match source.current_char() {
            Some(b'"') => {
                source.advance_by(1);
                let (text, found) = source.parse_escaped(b'\\', "\"", ConsumeNewline::No);
                if !found {
                    return Err(self.context.report(location, "Unterminated string literal"));
                }
                Literal::String(text.current_value())
            }
            Some(b'`') => {
                source.advance_by(1);
                let text = source.parse_until(|rest| rest[0] == b'`');
                if source.is_empty() {
                    return Err(self.context.report(location, "Unterminated string literal"));
                }
                source.advance_by(1);
                Literal::String(text.current_value())
            }
            Some(b'[') => {
                self.context.report(location, "Binary values are not supported");
                source.advance_by(1);
                source.parse_until(|rest| rest[0] == b']');
                if !source.is_empty() {
                    source.advance_by(1);
                }
                Literal::Binary
            }
            _ => {
                let word = source
                    .parse_until(|rest| rest[0].is_ascii_whitespace() || rest[0] == b';')
                    .current_value();
                match word.as_bytes().first() {
                    None => return Ok(LiteralMatch::Absent),
                    Some(c) if c.is_ascii_digit() || matches!(c, b'.' | b'+' | b'-') => Literal::Number(word),
                    Some(_) => match word {
                        "true" | "on" | "yes" => Literal::Boolean(true),
                        "false" | "off" | "no" => Literal::Boolean(false),
                        _ => return Ok(LiteralMatch::Unparseable(location)),
                    },
                }
            }
        };

        outer.commit(&source);
        Ok(LiteralMatch::Found(literal))
    }

    fn parse_attribute(&mut self, outer: &mut Source<'a>) -> ParseResult<Option<Attribute<'a>>> {
        let mut source = *outer;
        let Some(name) = parse_name(&mut source) else {
            return Ok(None);
        };

        if source.is_at_semantic_line_delimiter() || source.current_char() != Some(b'=') {
            return Err(self.context.report(source.start, "Malformed attribute"));
        }
        source.advance_by(1);

        if source.is_at_semantic_line_delimiter() {
            return Err(self.context.report(source.start, "Malformed attribute"));
        }
        let value = match self.parse_literal(&mut source)? {
            LiteralMatch::Found(value) => value,
            LiteralMatch::Absent | LiteralMatch::Unparseable(_) => {
                return Err(self.context.report(source.start, "Malformed attribute"));
            }
        };

        outer.commit(&source);
        Ok(Some(Attribute { name, value }))
    }

    fn parse_node(
        &mut self,
        outer: &mut Source<'a>,
        parent: NodeHandle,
        depth: usize,
    ) -> ParseResult<Option<NodeHandle>> {
        let mut source = *outer;
        loop {
            source.skip_whitespace_and_comments(ConsumeNewline::Yes);
            if source.current_char() != Some(b';') {
                break;
            }
            source.advance_by(1);
        }
        if source.is_empty() {
            return Ok(None);
        }

        let location = source.start;
        let name = parse_name(&mut source).unwrap_or_default();

        if source.current_char() == Some(b'=') {
            return Err(self.context.report(
                source.start,
                "Anonymous node must have at least 1 value, it appears to only have attributes",
            ));
        }

        let mut values = Values::new();
        let mut unparseable = None;
        loop {
            match self.parse_literal(&mut source)? {
                LiteralMatch::Found(value) => values.push(value),
                LiteralMatch::Absent => break,
                LiteralMatch::Unparseable(at) => {
                    unparseable = Some(at);
                    break;
                }
            }
        }
        if name.is_empty() && values.is_empty() {
            let at = unparseable.unwrap_or(source.start);
            return Err(self.context.report(at, "Unable to parse value"));
        }

        let mut attributes = Attributes::new();
        while let Some(attribute) = self.parse_attribute(&mut source)? {
            attributes.push(attribute);
        }

        // A literal right after the attributes means values and attributes got interleaved.
        let mut probe = source;
        if let LiteralMatch::Found(_) = self.parse_literal(&mut probe)? {
            let mut at = source;
            at.skip_whitespace_and_comments(ConsumeNewline::No);
            return Err(self.context.report(at.start, "Unexpected literal"));
        }

        source.skip_whitespace_and_comments(ConsumeNewline::No);
        // The child block may also open on the following line.
        if source.is_at_newline() {
            let mut next_line = source;
            next_line.advance_by(1);
            next_line.skip_whitespace_and_comments(ConsumeNewline::No);
            if next_line.current_char() == Some(b'{') {
                source = next_line;
            }
        }

        let handle = self
            .document
            .create_node()
            .ok_or_else(|| self.context.report(location, "Unable to create a node"))?;
        {
            let mut node = self.node_mut(handle, location)?;
            node.name = name;
            node.values = values;
            node.attributes = attributes;
            node.parent = Some(parent);
        }

        if source.current_char() == Some(b'{') {
            let open = source.start;
            if depth >= self.context.max_depth {
                let message = format!("Nesting depth exceeds {}", self.context.max_depth);
                return Err(self.context.report(open, message));
            }

            source.advance_by(1);
            let (mut children, found_closing) = source.parse_nested("{", "}", 1);
            if !found_closing {
                return Err(self.context.report(
                    open,
                    "The list of child nodes is not closed properly with curly braces.",
                ));
            }

            let first_child = self.parse_inner_nodes(&mut children, handle, depth + 1)?;
            self.node_mut(handle, open)?.first_child = first_child;
        }

        outer.commit(&source);
        Ok(Some(handle))
    }

    /// Parse a sibling list and return its first node, if any.
    fn parse_inner_nodes(
        &mut self,
        source: &mut Source<'a>,
        parent: NodeHandle,
        depth: usize,
    ) -> ParseResult<Option<NodeHandle>> {
        let Some(first) = self.parse_node(source, parent, depth)? else {
            return Ok(None);
        };

        let mut previous = first;
        while let Some(node) = self.parse_node(source, parent, depth)? {
            let location = source.start;
            self.node_mut(previous, location)?.next = Some(node);
            self.node_mut(node, location)?.previous = Some(previous);
            previous = node;
        }

        Ok(Some(first))
    }

    /// Link freshly parsed top-level nodes after the root's existing children.
    fn append_to_root(&mut self, existing_last: Option<NodeHandle>, first: NodeHandle) -> ParseResult<()> {
        let location = SourceLocation::start();
        match existing_last {
            None => self.node_mut(self.document.root(), location)?.first_child = Some(first),
            Some(last) => {
                self.node_mut(last, location)?.next = Some(first);
                self.node_mut(first, location)?.previous = Some(last);
            }
        }
        Ok(())
    }

    fn node_mut(&mut self, handle: NodeHandle, location: SourceLocation) -> ParseResult<NodeAccessMut<'d, 'a>> {
        let document = self.document;
        document
            .begin_node_access_mut(handle)
            .ok_or_else(|| self.context.report(location, "Unable to access a node"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(text: &str) -> Option<Literal<'_>> {
        let document = Document::new();
        let mut context = ParsingContext::default();
        let mut parser = Parser { document: &document, context: &mut context };
        let mut source = Source::new(text);
        match parser.parse_literal(&mut source) {
            Ok(LiteralMatch::Found(literal)) => Some(literal),
            _ => None,
        }
    }

    #[test]
    fn identifier_stops_at_invalid_char() {
        let mut source = Source::new("  Foo.bar$-1=2");
        let identifier = parse_identifier(&mut source).unwrap();
        assert_eq!(identifier.as_str(), "Foo.bar$-1");
        assert_eq!(source.current_value(), "=2");
    }

    #[test]
    fn identifier_rejects_invalid_start_without_consuming() {
        let mut source = Source::new(" 1abc");
        assert!(parse_identifier(&mut source).is_none());
        assert_eq!(source.start.offset, 0);
    }

    #[test]
    fn identifier_does_not_cross_newline() {
        let mut source = Source::new("\nFoo");
        assert!(parse_identifier(&mut source).is_none());
    }

    #[test]
    fn literal_kinds() {
        assert_eq!(literal(r#""hello""#), Some(Literal::String("hello")));
        assert_eq!(literal("`raw\ntext`"), Some(Literal::String("raw\ntext")));
        assert_eq!(literal("-0.5"), Some(Literal::Number("-0.5")));
        assert_eq!(literal(".5"), Some(Literal::Number(".5")));
        assert_eq!(literal("[00 ff]"), Some(Literal::Binary));
        assert_eq!(literal("yes"), Some(Literal::Boolean(true)));
        assert_eq!(literal("TRUE"), None);
        assert_eq!(literal("; 1"), None);
    }

    #[test]
    fn unparseable_word_is_not_consumed() {
        let document = Document::new();
        let mut context = ParsingContext::default();
        let mut parser = Parser { document: &document, context: &mut context };
        let mut source = Source::new("  word");

        let result = parser.parse_literal(&mut source).unwrap();
        assert!(matches!(result, LiteralMatch::Unparseable(SourceLocation { column: 3, .. })));
        assert_eq!(source.start.offset, 0);
        assert!(context.diagnostics().is_empty());
    }

    #[test]
    fn escapes_are_kept_verbatim() {
        assert_eq!(literal(r#""a\"b""#), Some(Literal::String(r#"a\"b"#)));
    }

    #[test]
    fn unterminated_string_is_reported() {
        let document = Document::new();
        let mut context = ParsingContext::default();
        let mut parser = Parser { document: &document, context: &mut context };
        let mut source = Source::new("\"open\nnext");

        assert!(parser.parse_literal(&mut source).is_err());
        assert_eq!(context.diagnostics()[0].message, "Unterminated string literal");
    }

    #[test]
    fn attribute_requires_value() {
        let document = Document::new();
        let mut context = ParsingContext::default();
        let mut parser = Parser { document: &document, context: &mut context };

        let mut source = Source::new(" Binding=3 rest");
        let attribute = parser.parse_attribute(&mut source).unwrap().unwrap();
        assert_eq!(attribute.name.as_str(), "Binding");
        assert_eq!(attribute.value, Literal::Number("3"));
        assert_eq!(source.current_value(), " rest");

        let mut source = Source::new(" { child }");
        assert_eq!(parser.parse_attribute(&mut source).unwrap(), None);

        let mut source = Source::new(" Binding=");
        assert!(parser.parse_attribute(&mut source).is_err());
    }
}
