//! `!include` directive
//!
//! The payload is a target string (or a `{path: target}` mapping, alias key
//! `urlpath`) resolved against `include_base_path`. The target is fetched and
//! parsed with the same safety mode and resolvers as the including document.
//! Glob targets expand to a sequence of the matching documents.

use crate::error::{Error, Result};
use crate::fetch::{is_glob, is_remote, join_location};
use crate::parser::Session;
use crate::value::Value;

const DIRECTIVE: &str = "!include";

/// Extract the target from a decoded `!include` payload
pub(crate) fn include_target(payload: &Value) -> Result<&str> {
    let target = match payload {
        Value::String(s) => s.as_str(),
        Value::Mapping(map) => map
            .get("path")
            .or_else(|| map.get("urlpath"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::invalid_directive(DIRECTIVE, "mapping payload needs a 'path' string")
            })?,
        other => {
            return Err(Error::invalid_directive(
                DIRECTIVE,
                format!("expected a target path, got {}", other.type_name()),
            ))
        }
    };

    let target = target.trim();
    if target.is_empty() {
        return Err(Error::invalid_directive(DIRECTIVE, "target path must not be empty"));
    }
    Ok(target)
}

/// Resolve an `!include` node to the included tree
pub(crate) fn resolve_include(session: &mut Session<'_>, payload: Value, path: &str) -> Result<Value> {
    let target = include_target(&payload)?;
    let base = session.options.include_base_path.as_deref().unwrap_or("");
    let location = join_location(base, target);

    if is_glob(target) && !is_remote(&location) {
        let matches = session.options.fetcher.expand(&location)?;
        log::debug!(
            "Include pattern '{}' at '{}' matched {} file(s)",
            target,
            path,
            matches.len()
        );
        let mut items = Vec::with_capacity(matches.len());
        for location in matches {
            items.push(include_one(session, &location, path)?);
        }
        return Ok(Value::Sequence(items));
    }

    include_one(session, &location, path)
}

fn include_one(session: &mut Session<'_>, location: &str, path: &str) -> Result<Value> {
    let canonical = session.options.fetcher.canonical(location);

    if session.include_stack.contains(&canonical) {
        let mut chain = session.include_stack.clone();
        chain.push(canonical);
        return Err(Error::include_cycle(chain));
    }

    log::debug!("Including '{}' at '{}'", location, path);
    session.include_stack.push(canonical);
    let result = session.load_location(location, false);
    session.include_stack.pop();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::parser::{load_yaml, LoadOptions, SafetyMode};
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn options(dir: &TempDir) -> LoadOptions {
        LoadOptions::default().with_include_base_path(dir.path())
    }

    #[test]
    fn test_include_target_forms() {
        assert_eq!(include_target(&Value::from("a.yaml")).unwrap(), "a.yaml");

        let mut map = IndexMap::new();
        map.insert("urlpath".to_string(), Value::from("b.yaml"));
        assert_eq!(include_target(&Value::Mapping(map)).unwrap(), "b.yaml");

        let err = include_target(&Value::from(3)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidDirective { .. }));
        assert!(include_target(&Value::from("  ")).is_err());
    }

    #[test]
    fn test_include_substitutes_tree() {
        let dir = TempDir::new().unwrap();
        write(&dir, "db.yaml", "host: localhost\nport: 5432\n");

        let value = load_yaml("database: !include db.yaml\n", &options(&dir)).unwrap();
        assert_eq!(
            value.get_path("database.port"),
            Some(&Value::from(5432))
        );
    }

    #[test]
    fn test_include_mapping_payload() {
        let dir = TempDir::new().unwrap();
        write(&dir, "db.yaml", "host: localhost\n");

        let value = load_yaml("database: !include {path: db.yaml}\n", &options(&dir)).unwrap();
        assert_eq!(
            value.get_path("database.host"),
            Some(&Value::from("localhost"))
        );
    }

    #[test]
    fn test_nested_include() {
        let dir = TempDir::new().unwrap();
        write(&dir, "outer.yaml", "inner: !include inner.yaml\n");
        write(&dir, "inner.yaml", "value: 42\n");

        let value = load_yaml("root: !include outer.yaml\n", &options(&dir)).unwrap();
        assert_eq!(value.get_path("root.inner.value"), Some(&Value::from(42)));
    }

    #[test]
    fn test_include_same_target_twice() {
        let dir = TempDir::new().unwrap();
        write(&dir, "shared.yaml", "x: [1, 2]\n");

        let value = load_yaml(
            "a: !include shared.yaml\nb: !include shared.yaml\n",
            &options(&dir),
        )
        .unwrap();
        assert_eq!(value.get_path("a"), value.get_path("b"));
    }

    #[test]
    fn test_include_json_target_by_extension() {
        let dir = TempDir::new().unwrap();
        write(&dir, "data.json", r#"{"items": [1, 2, 3]}"#);

        let value = load_yaml("data: !include data.json\n", &options(&dir)).unwrap();
        assert_eq!(value.get_path("data.items[2]"), Some(&Value::from(3)));
    }

    #[test]
    fn test_include_glob() {
        let dir = TempDir::new().unwrap();
        write(&dir, "parts/b.yaml", "name: b\n");
        write(&dir, "parts/a.yaml", "name: a\n");

        let value = load_yaml("parts: !include parts/*.yaml\n", &options(&dir)).unwrap();
        assert_eq!(value.get_path("parts[0].name"), Some(&Value::from("a")));
        assert_eq!(value.get_path("parts[1].name"), Some(&Value::from("b")));
    }

    #[test]
    fn test_include_not_found() {
        let dir = TempDir::new().unwrap();
        let err = load_yaml("x:\n  y: !include missing.yaml\n", &options(&dir)).unwrap_err();

        assert!(matches!(err.kind, ErrorKind::IncludeNotFound { .. }));
        assert_eq!(err.path.as_deref(), Some("x.y"));
    }

    #[test]
    fn test_include_cycle() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.yaml", "next: !include b.yaml\n");
        write(&dir, "b.yaml", "next: !include a.yaml\n");

        let err = load_yaml("start: !include a.yaml\n", &options(&dir)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IncludeCycle);
        let message = err.to_string();
        assert!(message.contains("a.yaml → "));
        assert!(message.contains("b.yaml"));
    }

    #[test]
    fn test_include_inherits_safety_mode() {
        let dir = TempDir::new().unwrap();
        write(&dir, "tagged.yaml", "w: !widget 1\n");

        let options = options(&dir).with_mode(SafetyMode::Safe);
        let err = load_yaml("x: !include tagged.yaml\n", &options).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownTag { .. }));
    }

    #[test]
    fn test_include_disabled() {
        let dir = TempDir::new().unwrap();
        write(&dir, "db.yaml", "host: localhost\n");

        let options = options(&dir).with_include(false);
        let value = load_yaml("database: !include db.yaml\n", &options).unwrap();
        assert_eq!(value.get_path("database"), Some(&Value::from("db.yaml")));
    }
}
