//! String template pass
//!
//! After construction (and inheritance), every string leaf is handed to a
//! [`TemplateRenderer`] together with a context tree: the caller's context, or
//! the resolved tree itself. Records are opaque and left untouched.
//!
//! The built-in [`PathRenderer`] understands `{{ dotted.path }}` placeholders:
//! - `{{ name }}` - value at `name` in the context
//! - `{{ servers[0].host }}` - sequence indexing
//! - `\{{` - a literal `{{`

use crate::error::{Error, Result};
use crate::parser::{index_path, key_path};
use crate::value::Value;

/// Renders one template string against a context
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &Value) -> Result<String>;
}

impl<F> TemplateRenderer for F
where
    F: Fn(&str, &Value) -> Result<String> + Send + Sync,
{
    fn render(&self, template: &str, context: &Value) -> Result<String> {
        self(template, context)
    }
}

/// Renderer for `{{ dotted.path }}` placeholders
#[derive(Debug, Clone, Copy, Default)]
pub struct PathRenderer;

impl TemplateRenderer for PathRenderer {
    fn render(&self, template: &str, context: &Value) -> Result<String> {
        if !template.contains("{{") {
            return Ok(template.to_string());
        }

        let mut out = String::with_capacity(template.len());
        for segment in TemplateParser::new(template).parse()? {
            match segment {
                Segment::Literal(text) => out.push_str(&text),
                Segment::Placeholder(expr) => {
                    let value = context.get_path(&expr).ok_or_else(|| {
                        Error::template(format!("undefined variable '{}'", expr))
                    })?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(out)
    }
}

/// A piece of a parsed template
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Parser for `{{ ... }}` templates
struct TemplateParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> TemplateParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(&mut self) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();
        let mut literal = String::new();

        while !self.is_eof() {
            if self.check_escape() {
                self.advance(); // backslash
                self.advance(); // {
                self.advance(); // {
                literal.push_str("{{");
            } else if self.check_open() {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(self.parse_placeholder()?);
            } else if let Some(c) = self.current() {
                literal.push(c);
                self.advance();
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(segments)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current() {
            self.pos += c.len_utf8();
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// At `\{{`
    fn check_escape(&self) -> bool {
        self.rest().starts_with("\\{{")
    }

    /// At `{{`
    fn check_open(&self) -> bool {
        self.rest().starts_with("{{")
    }

    fn parse_placeholder(&mut self) -> Result<Segment> {
        let start = self.pos;
        self.advance(); // {
        self.advance(); // {

        let Some(end) = self.rest().find("}}") else {
            return Err(Error::template(format!(
                "unclosed '{{{{' at offset {} in '{}'",
                start, self.input
            )));
        };

        let expr = self.rest()[..end].trim().to_string();
        self.pos += end + 2;

        if expr.is_empty() {
            return Err(Error::template(format!(
                "empty placeholder at offset {} in '{}'",
                start, self.input
            )));
        }
        Ok(Segment::Placeholder(expr))
    }
}

/// Render every string leaf of `tree`
///
/// `context` defaults to the tree as it was before rendering. With
/// `render_keys`, mapping keys are rendered too; two keys of one mapping
/// rendering to the same name is a template error.
pub fn resolve_strings(
    tree: Value,
    renderer: &dyn TemplateRenderer,
    context: Option<&Value>,
    render_keys: bool,
) -> Result<Value> {
    let snapshot;
    let context = match context {
        Some(context) => context,
        None => {
            snapshot = tree.clone();
            &snapshot
        }
    };
    render_node(tree, renderer, context, render_keys, "")
}

fn render_node(
    node: Value,
    renderer: &dyn TemplateRenderer,
    context: &Value,
    render_keys: bool,
    path: &str,
) -> Result<Value> {
    match node {
        Value::String(s) => renderer
            .render(&s, context)
            .map(Value::String)
            .map_err(|e| e.with_path(path)),
        Value::Sequence(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| render_node(item, renderer, context, render_keys, &index_path(path, i)))
            .collect::<Result<Vec<_>>>()
            .map(Value::Sequence),
        Value::Mapping(map) => {
            let mut rendered = indexmap::IndexMap::with_capacity(map.len());
            for (key, value) in map {
                let child_path = key_path(path, &key);
                let value = render_node(value, renderer, context, render_keys, &child_path)?;
                let key = if render_keys {
                    renderer
                        .render(&key, context)
                        .map_err(|e| e.with_path(child_path.as_str()))?
                } else {
                    key
                };
                if rendered.contains_key(&key) {
                    return Err(Error::template(format!(
                        "mapping key renders to '{}', which is already present",
                        key
                    ))
                    .with_path(child_path));
                }
                rendered.insert(key, value);
            }
            Ok(Value::Mapping(rendered))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::record::Record;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn mapping(entries: Vec<(&str, Value)>) -> Value {
        Value::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    #[test]
    fn test_parse_literal_only() {
        let segments = TemplateParser::new("plain").parse().unwrap();
        assert_eq!(segments, vec![Segment::Literal("plain".into())]);
    }

    #[test]
    fn test_parse_placeholder() {
        let segments = TemplateParser::new("Hello {{ name }}!").parse().unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Literal("Hello ".into()),
                Segment::Placeholder("name".into()),
                Segment::Literal("!".into()),
            ]
        );
    }

    #[test]
    fn test_parse_escape() {
        let segments = TemplateParser::new("\\{{ raw }}").parse().unwrap();
        assert_eq!(segments, vec![Segment::Literal("{{ raw }}".into())]);
    }

    #[test]
    fn test_parse_unclosed() {
        let err = TemplateParser::new("Hello {{ name").parse().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Template);
        assert!(err.to_string().contains("unclosed"));
    }

    #[test]
    fn test_parse_empty_placeholder() {
        assert!(TemplateParser::new("{{ }}").parse().is_err());
    }

    #[test]
    fn test_render_hello() {
        let context = mapping(vec![("name", Value::from("Ada"))]);
        let out = PathRenderer.render("Hello {{name}}", &context).unwrap();
        assert_eq!(out, "Hello Ada");
    }

    #[test]
    fn test_render_nested_and_indexed() {
        let context = mapping(vec![(
            "servers",
            Value::Sequence(vec![mapping(vec![
                ("host", Value::from("db1")),
                ("port", Value::from(5432)),
            ])]),
        )]);
        let out = PathRenderer
            .render("{{ servers[0].host }}:{{ servers[0].port }}", &context)
            .unwrap();
        assert_eq!(out, "db1:5432");
    }

    #[test]
    fn test_render_undefined() {
        let err = PathRenderer
            .render("Hi {{ missing }}", &Value::Null)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Template);
        assert!(err.to_string().contains("undefined variable 'missing'"));
    }

    #[test]
    fn test_render_without_syntax_is_identity() {
        let out = PathRenderer.render("no templates here", &Value::Null).unwrap();
        assert_eq!(out, "no templates here");
    }

    #[test]
    fn test_resolve_strings_with_context() {
        let tree = mapping(vec![("msg", Value::from("Hello {{name}}"))]);
        let context = mapping(vec![("name", Value::from("Ada"))]);

        let out = resolve_strings(tree, &PathRenderer, Some(&context), false).unwrap();
        assert_eq!(out, mapping(vec![("msg", Value::from("Hello Ada"))]));
    }

    #[test]
    fn test_resolve_strings_self_context() {
        let tree = mapping(vec![
            ("host", Value::from("db.internal")),
            ("url", Value::from("postgres://{{ host }}/app")),
        ]);

        let out = resolve_strings(tree, &PathRenderer, None, false).unwrap();
        assert_eq!(
            out.get_path("url"),
            Some(&Value::from("postgres://db.internal/app"))
        );
    }

    #[test]
    fn test_resolve_strings_skips_non_strings_and_records() {
        let mut fields = IndexMap::new();
        fields.insert("note".to_string(), Value::from("{{ undefined }}"));
        let tree = mapping(vec![
            ("count", Value::from(3)),
            ("flag", Value::from(true)),
            ("owner", Value::Record(Record::new("Person", "person", fields))),
        ]);

        let out = resolve_strings(tree.clone(), &PathRenderer, None, false).unwrap();
        assert_eq!(out, tree);
    }

    #[test]
    fn test_resolve_keys() {
        let tree = mapping(vec![
            ("env", Value::from("prod")),
            ("{{ env }}_url", Value::from("x")),
        ]);

        let out = resolve_strings(tree, &PathRenderer, None, true).unwrap();
        assert_eq!(out.get_path("prod_url"), Some(&Value::from("x")));
    }

    #[test]
    fn test_rendered_key_collision() {
        let tree = mapping(vec![
            ("env", Value::from("prod")),
            ("prod_url", Value::from("literal")),
            ("{{ env }}_url", Value::from("rendered")),
        ]);

        let err = resolve_strings(tree, &PathRenderer, None, true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Template);
        assert!(err.to_string().contains("prod_url"));
        assert_eq!(err.path.as_deref(), Some("{{ env }}_url"));
    }

    #[test]
    fn test_error_carries_path() {
        let tree = mapping(vec![(
            "greetings",
            Value::from(vec!["ok", "{{ nobody }}"]),
        )]);

        let err = resolve_strings(tree, &PathRenderer, None, false).unwrap_err();
        assert_eq!(err.path.as_deref(), Some("greetings[1]"));
    }

    #[test]
    fn test_closure_renderer() {
        let upper = |template: &str, _: &Value| -> Result<String> { Ok(template.to_uppercase()) };
        let tree = mapping(vec![("a", Value::from("shout"))]);

        let out = resolve_strings(tree, &upper, None, false).unwrap();
        assert_eq!(out.get_path("a"), Some(&Value::from("SHOUT")));
    }
}
