//! `INHERIT` resolution
//!
//! A document's top-level `INHERIT` key names one ancestor or an ordered list
//! of them, relative to the document's own directory (or URL). Each ancestor
//! is loaded and resolved recursively, then the chain is folded left to
//! right with [`Value::merge`] and the document itself is merged on top.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::fetch::join_location;
use crate::parser::Session;
use crate::value::Value;

/// Reserved top-level key naming a document's ancestors
pub const INHERIT_KEY: &str = "INHERIT";

/// Normalize an `INHERIT` value into an ordered list of locations
///
/// Absent, null, empty string and empty sequence all mean "no ancestors".
pub fn inheritance_chain(value: Option<&Value>) -> Result<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.trim().to_string()]),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
                other => Err(Error::invalid_directive(
                    INHERIT_KEY,
                    format!("entries must be non-empty paths, got {}", other.type_name()),
                )),
            })
            .collect(),
        Some(other) => Err(Error::invalid_directive(
            INHERIT_KEY,
            format!(
                "expected a path or a list of paths, got {}",
                other.type_name()
            ),
        )),
    }
}

/// Merge a document's ancestors beneath it
///
/// Documents that are not mappings, or have no `INHERIT` key, are returned
/// unchanged.
pub(crate) fn resolve_inherit(session: &mut Session<'_>, tree: Value, base_dir: &str) -> Result<Value> {
    let Value::Mapping(mut own) = tree else {
        return Ok(tree);
    };

    let directive = own.shift_remove(INHERIT_KEY);
    let chain = inheritance_chain(directive.as_ref()).map_err(|e| e.with_path(INHERIT_KEY))?;
    if chain.is_empty() {
        return Ok(Value::Mapping(own));
    }

    let mut merged = Value::Mapping(IndexMap::new());
    for entry in &chain {
        let location = join_location(base_dir, entry);
        let ancestor = load_ancestor(session, &location)?;
        log::debug!("Merging ancestor '{}'", location);
        merged.merge(ancestor);
    }
    merged.merge(Value::Mapping(own));

    Ok(merged)
}

fn load_ancestor(session: &mut Session<'_>, location: &str) -> Result<Value> {
    let canonical = session.options.fetcher.canonical(location);

    if session.inherit_stack.contains(&canonical) {
        let mut chain = session.inherit_stack.clone();
        chain.push(canonical);
        return Err(Error::inherit_cycle(chain));
    }

    log::debug!("Loading ancestor '{}'", location);
    session.inherit_stack.push(canonical);
    let result = session.load_location(location, true);
    session.inherit_stack.pop();

    result.map_err(|e| {
        if e.help.is_none() {
            e.with_help(format!("Check the INHERIT entry '{}'", location))
        } else {
            e
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::parser::{load_yaml, load_yaml_file, LoadOptions};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn inherit_options() -> LoadOptions {
        LoadOptions::default().with_resolve_inherit(true)
    }

    #[test]
    fn test_chain_normalization() {
        assert!(inheritance_chain(None).unwrap().is_empty());
        assert!(inheritance_chain(Some(&Value::Null)).unwrap().is_empty());
        assert!(inheritance_chain(Some(&Value::from(""))).unwrap().is_empty());
        assert_eq!(
            inheritance_chain(Some(&Value::from("base.yaml"))).unwrap(),
            vec!["base.yaml"]
        );
        assert_eq!(
            inheritance_chain(Some(&Value::from(vec!["a.yaml", "b.yaml"]))).unwrap(),
            vec!["a.yaml", "b.yaml"]
        );
    }

    #[test]
    fn test_chain_rejects_bad_types() {
        let err = inheritance_chain(Some(&Value::from(3))).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidDirective { .. }));

        let err = inheritance_chain(Some(&Value::Sequence(vec![Value::from(1)]))).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidDirective { .. }));
    }

    #[test]
    fn test_single_inheritance() {
        let dir = TempDir::new().unwrap();
        write(&dir, "base.yaml", "name: base\nsettings:\n  timeout: 30\n  retries: 3\n");
        let feature = write(
            &dir,
            "feature.yaml",
            "INHERIT: base.yaml\nname: feature\nsettings:\n  timeout: 60\n",
        );

        let value = load_yaml_file(&feature, &inherit_options()).unwrap();
        assert_eq!(value.get_path("name"), Some(&Value::from("feature")));
        assert_eq!(value.get_path("settings.timeout"), Some(&Value::from(60)));
        assert_eq!(value.get_path("settings.retries"), Some(&Value::from(3)));
        assert!(value.get_path("INHERIT").is_none());
    }

    #[test]
    fn test_later_chain_entries_win() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.yaml", "level: a\nonly_a: 1\n");
        write(&dir, "b.yaml", "level: b\nonly_b: 2\n");
        let child = write(&dir, "child.yaml", "INHERIT: [a.yaml, b.yaml]\n");

        let value = load_yaml_file(&child, &inherit_options()).unwrap();
        assert_eq!(value.get_path("level"), Some(&Value::from("b")));
        assert_eq!(value.get_path("only_a"), Some(&Value::from(1)));
        assert_eq!(value.get_path("only_b"), Some(&Value::from(2)));
    }

    #[test]
    fn test_no_inherit_key_is_identity() {
        let dir = TempDir::new().unwrap();
        let plain = write(&dir, "plain.yaml", "a: 1\nb: [1, 2]\n");

        let with = load_yaml_file(&plain, &inherit_options()).unwrap();
        let without = load_yaml_file(&plain, &LoadOptions::default()).unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn test_empty_inherit_is_removed() {
        let dir = TempDir::new().unwrap();
        let doc = write(&dir, "doc.yaml", "INHERIT: []\na: 1\n");

        let value = load_yaml_file(&doc, &inherit_options()).unwrap();
        assert_eq!(value, load_yaml("a: 1", &LoadOptions::default()).unwrap());
    }

    #[test]
    fn test_inherit_cycle() {
        let dir = TempDir::new().unwrap();
        let first = write(&dir, "circular1.yaml", "INHERIT: circular2.yaml\nname: circular1\n");
        write(&dir, "circular2.yaml", "INHERIT: circular1.yaml\nname: circular2\n");

        let err = load_yaml_file(&first, &inherit_options()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InheritCycle);
    }

    #[test]
    fn test_self_inheritance_is_a_cycle() {
        let dir = TempDir::new().unwrap();
        let doc = write(&dir, "self.yaml", "INHERIT: ./self.yaml\n");

        let err = load_yaml_file(&doc, &inherit_options()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InheritCycle);
    }

    #[test]
    fn test_missing_ancestor() {
        let dir = TempDir::new().unwrap();
        let doc = write(&dir, "invalid.yaml", "INHERIT: nonexistent.yaml\nname: invalid\n");

        let err = load_yaml_file(&doc, &inherit_options()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::IncludeNotFound { .. }));
    }

    #[test]
    fn test_string_document_resolves_against_include_base() {
        let dir = TempDir::new().unwrap();
        write(&dir, "base.yaml", "version: '1.0'\n");

        let options = inherit_options().with_include_base_path(dir.path());
        let value = load_yaml("INHERIT: base.yaml\nname: inline\n", &options).unwrap();
        assert_eq!(value.get_path("version"), Some(&Value::from("1.0")));
        assert_eq!(value.get_path("name"), Some(&Value::from("inline")));
    }

    #[test]
    fn test_non_mapping_document_unchanged() {
        let value = load_yaml("- a\n- b\n", &inherit_options()).unwrap();
        assert_eq!(value, Value::from(vec!["a", "b"]));
    }
}
