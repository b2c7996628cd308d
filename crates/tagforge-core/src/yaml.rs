//! Tag-preserving YAML node loader
//!
//! Builds a [`Node`] tree from yaml-rust2 parser events. Unlike a typed
//! deserializer, every node keeps its tag (local `!name` and native `!!name`
//! alike) so the construction pass can gate and dispatch them. Anchors are
//! resolved by copying the anchored node, and `<<` merge keys are expanded
//! while the enclosing mapping is closed.

use std::collections::HashMap;

use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser, Tag};
use yaml_rust2::scanner::{Marker, TScalarStyle};

use crate::error::{Error, Result, SourceLocation};
use crate::value::Value;

/// Tag handle the parser expands `!!` into
const CORE_SCHEMA_PREFIX: &str = "tag:yaml.org,2002:";

const MERGE_KEY: &str = "<<";

/// A parsed YAML node
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Node {
    /// Tag without its leading `!`: `person` for `!person`, `!str` for `!!str`
    pub tag: Option<String>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeKind {
    /// Scalar text; `plain` is false for quoted and block scalars
    Scalar { text: String, plain: bool },
    Sequence(Vec<Node>),
    Mapping(Vec<(Node, Node)>),
}

impl Node {
    fn scalar(text: String, plain: bool, tag: Option<String>) -> Self {
        Self {
            tag,
            kind: NodeKind::Scalar { text, plain },
        }
    }

    /// Text of an untagged plain scalar
    fn plain_text(&self) -> Option<&str> {
        match (&self.tag, &self.kind) {
            (None, NodeKind::Scalar { text, plain: true }) => Some(text),
            _ => None,
        }
    }
}

/// Parse the first document of `text`
///
/// An empty stream yields `None`.
pub(crate) fn parse(text: &str, source: Option<&str>) -> Result<Option<Node>> {
    let file = source.unwrap_or("<string>");
    let mut builder = NodeBuilder::new(file);
    let mut parser = Parser::new_from_str(text);

    parser.load(&mut builder, false).map_err(|e| {
        let marker = e.marker();
        Error::format_parse("YAML", e.info().to_string()).with_source_location(SourceLocation {
            file: file.to_string(),
            line: Some(marker.line() + 1),
            column: Some(marker.col() + 1),
        })
    })?;

    builder.finish()
}

/// A container being filled
enum Frame {
    Sequence {
        anchor: usize,
        tag: Option<String>,
        items: Vec<Node>,
    },
    Mapping {
        anchor: usize,
        tag: Option<String>,
        marker: Marker,
        entries: Vec<(Node, Node)>,
        pending_key: Option<Node>,
    },
}

struct NodeBuilder<'a> {
    file: &'a str,
    stack: Vec<Frame>,
    anchors: HashMap<usize, Node>,
    root: Option<Node>,
    /// First structural error; later events are ignored once set
    error: Option<Error>,
}

impl<'a> NodeBuilder<'a> {
    fn new(file: &'a str) -> Self {
        Self {
            file,
            stack: Vec::new(),
            anchors: HashMap::new(),
            root: None,
            error: None,
        }
    }

    fn finish(self) -> Result<Option<Node>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.root),
        }
    }

    fn fail(&mut self, message: String, marker: Marker) {
        if self.error.is_none() {
            self.error = Some(Error::format_parse("YAML", message).with_source_location(
                SourceLocation {
                    file: self.file.to_string(),
                    line: Some(marker.line() + 1),
                    column: Some(marker.col() + 1),
                },
            ));
        }
    }

    fn remember(&mut self, anchor: usize, node: &Node) {
        if anchor > 0 {
            self.anchors.insert(anchor, node.clone());
        }
    }

    fn push_complete(&mut self, node: Node) {
        match self.stack.last_mut() {
            None => {
                if self.root.is_none() {
                    self.root = Some(node);
                }
            }
            Some(Frame::Sequence { items, .. }) => items.push(node),
            Some(Frame::Mapping {
                entries,
                pending_key,
                ..
            }) => match pending_key.take() {
                Some(key) => entries.push((key, node)),
                None => *pending_key = Some(node),
            },
        }
    }

    fn close_mapping(
        &mut self,
        tag: Option<String>,
        entries: Vec<(Node, Node)>,
        marker: Marker,
    ) -> Option<Node> {
        match expand_merge_keys(entries) {
            Ok(entries) => Some(Node {
                tag,
                kind: NodeKind::Mapping(entries),
            }),
            Err(message) => {
                self.fail(message, marker);
                None
            }
        }
    }
}

impl MarkedEventReceiver for NodeBuilder<'_> {
    fn on_event(&mut self, ev: Event, marker: Marker) {
        if self.error.is_some() {
            return;
        }

        match ev {
            Event::Scalar(text, style, anchor, tag) => {
                // A bare `!` forces the string reading of a plain scalar
                let non_specific = tag.as_ref().is_some_and(is_non_specific);
                let plain = matches!(style, TScalarStyle::Plain) && !non_specific;
                let tag = if non_specific { None } else { tag_name(tag) };
                let node = Node::scalar(text, plain, tag);
                self.remember(anchor, &node);
                self.push_complete(node);
            }

            Event::SequenceStart(anchor, tag) => {
                self.stack.push(Frame::Sequence {
                    anchor,
                    tag: tag_name(tag),
                    items: Vec::new(),
                });
            }

            Event::SequenceEnd => match self.stack.pop() {
                Some(Frame::Sequence { anchor, tag, items }) => {
                    let node = Node {
                        tag,
                        kind: NodeKind::Sequence(items),
                    };
                    self.remember(anchor, &node);
                    self.push_complete(node);
                }
                _ => self.fail("sequence end without a matching start".into(), marker),
            },

            Event::MappingStart(anchor, tag) => {
                self.stack.push(Frame::Mapping {
                    anchor,
                    tag: tag_name(tag),
                    marker,
                    entries: Vec::new(),
                    pending_key: None,
                });
            }

            Event::MappingEnd => match self.stack.pop() {
                Some(Frame::Mapping {
                    anchor,
                    tag,
                    marker: start,
                    entries,
                    pending_key,
                }) => {
                    if pending_key.is_some() {
                        self.fail("mapping key without a value".into(), marker);
                        return;
                    }
                    if let Some(node) = self.close_mapping(tag, entries, start) {
                        self.remember(anchor, &node);
                        self.push_complete(node);
                    }
                }
                _ => self.fail("mapping end without a matching start".into(), marker),
            },

            Event::Alias(anchor) => match self.anchors.get(&anchor).cloned() {
                Some(node) => self.push_complete(node),
                None => self.fail(format!("unknown anchor id {}", anchor), marker),
            },

            _ => {}
        }
    }
}

fn is_non_specific(tag: &Tag) -> bool {
    matches!(
        (tag.handle.as_str(), tag.suffix.as_str()),
        ("!", "") | ("", "!")
    )
}

/// Normalize a parser tag into the name handed to tag dispatch
fn tag_name(tag: Option<Tag>) -> Option<String> {
    let tag = tag?;
    let (handle, suffix) = (tag.handle, tag.suffix);
    let name = match handle.as_str() {
        "!" => suffix,
        "!!" | CORE_SCHEMA_PREFIX => format!("!{}", suffix),
        "" => match (suffix.strip_prefix(CORE_SCHEMA_PREFIX), suffix.strip_prefix('!')) {
            (Some(native), _) => format!("!{}", native),
            (None, Some(local)) => local.to_string(),
            (None, None) => suffix,
        },
        other => format!("{}{}", other, suffix),
    };
    Some(name)
}

/// Expand `<<` entries: merged keys come first so explicit keys override them,
/// and earlier sources in a `<<: [a, b]` list take precedence over later ones
fn expand_merge_keys(entries: Vec<(Node, Node)>) -> std::result::Result<Vec<(Node, Node)>, String> {
    if !entries.iter().any(|(k, _)| k.plain_text() == Some(MERGE_KEY)) {
        return Ok(entries);
    }

    let mut merged = Vec::new();
    let mut own = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        if key.plain_text() != Some(MERGE_KEY) {
            own.push((key, value));
            continue;
        }
        match value.kind {
            NodeKind::Mapping(source) => merged.extend(source),
            NodeKind::Sequence(sources) => {
                let mut collected = Vec::new();
                for source in sources.into_iter().rev() {
                    match source.kind {
                        NodeKind::Mapping(source) => collected.extend(source),
                        _ => {
                            return Err(
                                "expected a mapping for merging, found a non-mapping in the list"
                                    .into(),
                            )
                        }
                    }
                }
                merged.extend(collected);
            }
            NodeKind::Scalar { .. } => {
                return Err("expected a mapping or list of mappings for merging".into())
            }
        }
    }

    merged.extend(own);
    Ok(merged)
}

/// Resolve a plain scalar by the YAML 1.2 core schema
pub(crate) fn resolve_plain(text: &str) -> Value {
    match text {
        "" | "~" | "null" | "Null" | "NULL" => return Value::Null,
        "true" | "True" | "TRUE" => return Value::Bool(true),
        "false" | "False" | "FALSE" => return Value::Bool(false),
        _ => {}
    }

    if let Some(i) = parse_int(text) {
        return Value::Integer(i);
    }
    if let Some(f) = parse_float(text) {
        return Value::Float(f);
    }
    Value::String(text.to_string())
}

fn parse_int(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x") {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(oct) = text.strip_prefix("0o") {
        return i64::from_str_radix(oct, 8).ok();
    }
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn parse_float(text: &str) -> Option<f64> {
    let unsigned = text.strip_prefix(['-', '+']).unwrap_or(text);
    let negative = text.starts_with('-');

    match unsigned {
        ".inf" | ".Inf" | ".INF" => {
            return Some(if negative {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            })
        }
        ".nan" | ".NaN" | ".NAN" if unsigned.len() == text.len() => return Some(f64::NAN),
        _ => {}
    }

    let starts_ok = unsigned
        .bytes()
        .next()
        .is_some_and(|b| b.is_ascii_digit() || b == b'.');
    let chars_ok = unsigned
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'-' | b'+'));
    let has_digit = unsigned.bytes().any(|b| b.is_ascii_digit());
    if !(starts_ok && chars_ok && has_digit) {
        return None;
    }
    text.parse().ok()
}
