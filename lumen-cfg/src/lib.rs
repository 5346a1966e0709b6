//! Cfg: a small declarative text format of named nodes carrying values,
//! `key=value` attributes and nested `{}` child blocks.
//!
//! ```text
//! NodeName "value1" "value2" Attr1=1.0 Attr2=true {
//!   ChildNode ...
//! }
//! ```

mod scan;

pub mod document;
pub mod parser;
pub mod source;

pub use document::{
    Attribute, Attributes, Children, Document, Identifier, Literal, LiteralKind, Node, NodeAccess, NodeAccessMut,
    NodeHandle, Values,
};
pub use parser::{parse, parse_document, CfgError, Diagnostic, ParsingContext, DEFAULT_MAX_DEPTH};
pub use source::{ConsumeNewline, Source, SourceLocation};
