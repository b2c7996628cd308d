//! INI codec
//!
//! Follows the defaults of Python's `configparser`: `key = value` or
//! `key: value`, `#` and `;` full-line comments, indented continuation lines,
//! lower-cased keys, `[DEFAULT]` values visible in every section, and
//! `%(name)s` interpolation with `%%` for a literal percent sign.

use std::collections::HashMap;

use indexmap::IndexMap;

/// Name of the section whose values every other section inherits
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Nesting limit for `%(name)s` references
const MAX_INTERPOLATION_DEPTH: usize = 10;

/// Parsed sections: section name to (key to value)
pub type Sections = IndexMap<String, IndexMap<String, String>>;

/// INI syntax errors, with 1-based line numbers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IniError {
    #[error("line {line}: entry outside of any section")]
    MissingSectionHeader { line: usize },
    #[error("line {line}: malformed section header '{text}'")]
    MalformedHeader { line: usize, text: String },
    #[error("line {line}: expected 'key = value' or 'key: value', found '{text}'")]
    MalformedEntry { line: usize, text: String },
    #[error("line {line}: section '{section}' already exists")]
    DuplicateSection { line: usize, section: String },
    #[error("line {line}: option '{key}' in section '{section}' already exists")]
    DuplicateOption {
        line: usize,
        section: String,
        key: String,
    },
    #[error("line {line}: bad interpolation syntax in option '{key}' of section '{section}': '{text}'")]
    InterpolationSyntax {
        line: usize,
        section: String,
        key: String,
        text: String,
    },
    #[error("line {line}: option '{key}' in section '{section}' references missing option '{reference}'")]
    InterpolationMissing {
        line: usize,
        section: String,
        key: String,
        reference: String,
    },
    #[error("line {line}: interpolation of option '{key}' in section '{section}' is nested too deeply")]
    InterpolationDepth {
        line: usize,
        section: String,
        key: String,
    },
}

impl IniError {
    pub fn line(&self) -> usize {
        match self {
            IniError::MissingSectionHeader { line }
            | IniError::MalformedHeader { line, .. }
            | IniError::MalformedEntry { line, .. }
            | IniError::DuplicateSection { line, .. }
            | IniError::DuplicateOption { line, .. }
            | IniError::InterpolationSyntax { line, .. }
            | IniError::InterpolationMissing { line, .. }
            | IniError::InterpolationDepth { line, .. } => *line,
        }
    }
}

/// Parse INI text into sections
///
/// The DEFAULT section is folded into every other section and not returned.
/// `%(name)s` references are expanded from the same section, then DEFAULT.
pub fn parse(text: &str) -> Result<Sections, IniError> {
    let mut defaults: IndexMap<String, String> = IndexMap::new();
    let mut sections: Sections = IndexMap::new();
    let mut current: Option<String> = None;
    let mut last_key: Option<String> = None;
    let mut entry_lines: HashMap<(String, String), usize> = HashMap::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            last_key = None;
            continue;
        }
        if trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        let indented = raw.starts_with([' ', '\t']);
        if indented {
            if let (Some(section), Some(key)) = (&current, &last_key) {
                let target = if section == DEFAULT_SECTION {
                    defaults.get_mut(key)
                } else {
                    sections.get_mut(section).and_then(|s| s.get_mut(key))
                };
                if let Some(value) = target {
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(trimmed);
                    continue;
                }
            }
        }

        if let Some(header) = trimmed.strip_prefix('[') {
            let name = header
                .strip_suffix(']')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| IniError::MalformedHeader {
                    line,
                    text: trimmed.to_string(),
                })?;
            if name != DEFAULT_SECTION {
                if sections.contains_key(name) {
                    return Err(IniError::DuplicateSection {
                        line,
                        section: name.to_string(),
                    });
                }
                sections.insert(name.to_string(), IndexMap::new());
            }
            current = Some(name.to_string());
            last_key = None;
            continue;
        }

        let Some(section) = &current else {
            return Err(IniError::MissingSectionHeader { line });
        };

        let split_at = trimmed.find(['=', ':']).ok_or_else(|| IniError::MalformedEntry {
            line,
            text: trimmed.to_string(),
        })?;
        let key = trimmed[..split_at].trim().to_lowercase();
        let value = trimmed[split_at + 1..].trim().to_string();
        if key.is_empty() {
            return Err(IniError::MalformedEntry {
                line,
                text: trimmed.to_string(),
            });
        }

        let entries = if section == DEFAULT_SECTION {
            &mut defaults
        } else {
            match sections.get_mut(section) {
                Some(entries) => entries,
                None => return Err(IniError::MissingSectionHeader { line }),
            }
        };
        if entries.contains_key(&key) {
            return Err(IniError::DuplicateOption {
                line,
                section: section.clone(),
                key,
            });
        }
        entries.insert(key.clone(), value);
        entry_lines.insert((section.clone(), key.clone()), line);
        last_key = Some(key);
    }

    for entries in sections.values_mut() {
        for (key, value) in &defaults {
            if !entries.contains_key(key) {
                entries.insert(key.clone(), value.clone());
            }
        }
    }

    let mut resolved = Sections::with_capacity(sections.len());
    for (section, entries) in &sections {
        let mut values = IndexMap::with_capacity(entries.len());
        for (key, raw) in entries {
            let line = entry_lines
                .get(&(section.clone(), key.clone()))
                .or_else(|| entry_lines.get(&(DEFAULT_SECTION.to_string(), key.clone())))
                .copied()
                .unwrap_or_default();
            let option = OptionRef { section, key, line };
            values.insert(key.clone(), interpolate(raw, entries, &option, 1)?);
        }
        resolved.insert(section.clone(), values);
    }

    Ok(resolved)
}

/// The option whose value is being interpolated, for error reports
struct OptionRef<'a> {
    section: &'a str,
    key: &'a str,
    line: usize,
}

fn interpolate(
    raw: &str,
    entries: &IndexMap<String, String>,
    option: &OptionRef<'_>,
    depth: usize,
) -> Result<String, IniError> {
    if depth > MAX_INTERPOLATION_DEPTH {
        return Err(IniError::InterpolationDepth {
            line: option.line,
            section: option.section.to_string(),
            key: option.key.to_string(),
        });
    }

    let syntax_error = |text: &str| IniError::InterpolationSyntax {
        line: option.line,
        section: option.section.to_string(),
        key: option.key.to_string(),
        text: text.to_string(),
    };

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('%') {
            out.push('%');
            rest = tail;
        } else if let Some(tail) = after.strip_prefix('(') {
            let close = tail.find(")s").ok_or_else(|| syntax_error(&rest[pos..]))?;
            let reference = tail[..close].to_lowercase();
            let value = entries
                .get(&reference)
                .ok_or_else(|| IniError::InterpolationMissing {
                    line: option.line,
                    section: option.section.to_string(),
                    key: option.key.to_string(),
                    reference: reference.clone(),
                })?;
            if value.contains('%') {
                out.push_str(&interpolate(value, entries, option, depth + 1)?);
            } else {
                out.push_str(value);
            }
            rest = &tail[close + 2..];
        } else {
            return Err(syntax_error(&rest[pos..]));
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Write sections as INI text
///
/// Multi-line values are written as tab-indented continuation lines, and `%`
/// is escaped as `%%` so the output parses back to the same values.
pub fn write(sections: &Sections) -> String {
    let mut out = String::new();
    for (name, entries) in sections {
        out.push('[');
        out.push_str(name);
        out.push_str("]\n");
        for (key, value) in entries {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(&value.replace('%', "%%").replace('\n', "\n\t"));
            out.push('\n');
        }
        out.push('\n');
    }
    out
}
