//! Parser construction and tag dispatch
//!
//! A [`Parser`] is assembled from [`LoadOptions`]: a safety mode plus the
//! resolvers to wire in. Loading runs in up to three passes:
//!
//! 1. Construction: the raw YAML tree is converted node by node. Tagged nodes
//!    are dispatched to `!include`, `!ENV`, the tag registry, or the native
//!    YAML tag handling allowed by the safety mode.
//! 2. Inheritance (`resolve_inherit`): `INHERIT` ancestors are loaded and
//!    merged beneath the document.
//! 3. Templates (`resolve_strings`): string leaves are rendered against the
//!    final tree.
//!
//! Any error aborts the whole load; no partial tree is returned.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::convert::TypeConverters;
use crate::env::EnvReference;
use crate::error::{Error, Result, SourceLocation};
use crate::fetch::{parent_location, DefaultFetcher, Fetcher};
use crate::format::{self, Format};
use crate::include;
use crate::inherit;
use crate::record::FieldShape;
use crate::tags::TagRegistry;
use crate::template::{self, PathRenderer, TemplateRenderer};
use crate::value::Value;
use crate::yaml::{self, Node, NodeKind};

/// Native YAML tags allowed in [`SafetyMode::Safe`]
const CORE_TAGS: &[&str] = &["str", "int", "float", "bool", "null", "seq", "map"];

/// Additional native YAML tags allowed in [`SafetyMode::Full`]
const FULL_TAGS: &[&str] = &["binary", "timestamp", "set", "omap", "pairs"];

const YAML_TAG_PREFIX: &str = "tag:yaml.org,2002:";

/// Construction-time gate on which tags may be materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SafetyMode {
    /// Core YAML schema only
    Safe,
    /// Core schema plus binary, timestamp, set, omap and pairs
    Full,
    /// Any tag; unknown tags keep their untagged payload
    #[default]
    Unsafe,
}

impl SafetyMode {
    /// Check whether a native (`!!name`) tag may be constructed
    pub fn allows_native(&self, name: &str) -> bool {
        match self {
            SafetyMode::Safe => CORE_TAGS.contains(&name),
            SafetyMode::Full => CORE_TAGS.contains(&name) || FULL_TAGS.contains(&name),
            SafetyMode::Unsafe => true,
        }
    }
}

impl fmt::Display for SafetyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyMode::Safe => write!(f, "safe"),
            SafetyMode::Full => write!(f, "full"),
            SafetyMode::Unsafe => write!(f, "unsafe"),
        }
    }
}

impl FromStr for SafetyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(SafetyMode::Safe),
            "full" => Ok(SafetyMode::Full),
            "unsafe" => Ok(SafetyMode::Unsafe),
            other => Err(Error::invalid_directive(
                "mode",
                format!("unknown safety mode '{}'", other),
            )
            .with_help("Valid modes: safe, full, unsafe")),
        }
    }
}

/// Options controlling a load
#[derive(Clone)]
pub struct LoadOptions {
    /// Safety gate applied to every tagged node
    pub mode: SafetyMode,
    /// Base for resolving `!include` targets (default: current directory)
    pub include_base_path: Option<String>,
    /// Wire in the `!include` resolver
    pub enable_include: bool,
    /// Wire in the `!ENV` resolver
    pub enable_env: bool,
    /// Treat an unset `!ENV` variable without default as an error
    pub strict_env: bool,
    /// Render string leaves as templates after construction
    pub resolve_strings: bool,
    /// Also render mapping keys (requires `resolve_strings`)
    pub resolve_dict_keys: bool,
    /// Resolve `INHERIT` directives
    pub resolve_inherit: bool,
    /// Handlers for custom tags
    pub registry: Arc<TagRegistry>,
    /// Source of include and INHERIT bytes
    pub fetcher: Arc<dyn Fetcher>,
    /// Renderer for the template pass
    pub renderer: Arc<dyn TemplateRenderer>,
    /// Template context; the resolved tree itself when `None`
    pub template_context: Option<Value>,
    /// Coercion hooks for `!ENV` values and record fields
    pub type_converters: TypeConverters,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            mode: SafetyMode::default(),
            include_base_path: None,
            enable_include: true,
            enable_env: true,
            strict_env: false,
            resolve_strings: false,
            resolve_dict_keys: false,
            resolve_inherit: false,
            registry: Arc::new(TagRegistry::new()),
            fetcher: Arc::new(DefaultFetcher::new()),
            renderer: Arc::new(PathRenderer),
            template_context: None,
            type_converters: TypeConverters::new(),
        }
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("mode", &self.mode)
            .field("include_base_path", &self.include_base_path)
            .field("enable_include", &self.enable_include)
            .field("enable_env", &self.enable_env)
            .field("strict_env", &self.strict_env)
            .field("resolve_strings", &self.resolve_strings)
            .field("resolve_dict_keys", &self.resolve_dict_keys)
            .field("resolve_inherit", &self.resolve_inherit)
            .field("registry", &self.registry.list_tags())
            .field("template_context", &self.template_context.is_some())
            .field("type_converters", &self.type_converters)
            .finish()
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: SafetyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the base for `!include` targets (a directory or URL prefix)
    pub fn with_include_base_path(mut self, base: impl AsRef<Path>) -> Self {
        self.include_base_path = Some(base.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn with_include(mut self, enabled: bool) -> Self {
        self.enable_include = enabled;
        self
    }

    pub fn with_env(mut self, enabled: bool) -> Self {
        self.enable_env = enabled;
        self
    }

    pub fn with_strict_env(mut self, strict: bool) -> Self {
        self.strict_env = strict;
        self
    }

    pub fn with_resolve_strings(mut self, enabled: bool) -> Self {
        self.resolve_strings = enabled;
        self
    }

    pub fn with_resolve_dict_keys(mut self, enabled: bool) -> Self {
        self.resolve_dict_keys = enabled;
        self
    }

    pub fn with_resolve_inherit(mut self, enabled: bool) -> Self {
        self.resolve_inherit = enabled;
        self
    }

    pub fn with_registry(mut self, registry: TagRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    pub fn with_renderer(mut self, renderer: impl TemplateRenderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn with_template_context(mut self, context: Value) -> Self {
        self.template_context = Some(context);
        self
    }

    pub fn with_type_converters(mut self, converters: TypeConverters) -> Self {
        self.type_converters = converters;
        self
    }
}

/// A configured loader
///
/// Construction does no I/O. One parser can load any number of documents;
/// each load has its own include and INHERIT stacks.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    options: LoadOptions,
}

impl Parser {
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Load a YAML document from a string
    pub fn load_str(&self, text: &str) -> Result<Value> {
        self.load_str_as(text, Format::Yaml)
    }

    /// Load a document of any supported format from a string
    pub fn load_str_as(&self, text: &str, format: Format) -> Result<Value> {
        Session::new(&self.options).load_root(text, format, None)
    }

    /// Load a document from a file, choosing the format by extension
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let format = Format::from_path(path).unwrap_or(Format::Yaml);
        self.load_file_as(path, format)
    }

    /// Load a document from a file in the given format
    pub fn load_file_as(&self, path: impl AsRef<Path>, format: Format) -> Result<Value> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::io(format!("Failed to read {}: {}", path.display(), e))
                .with_help("Check that the file exists and is readable")
        })?;
        let source = path.to_string_lossy();
        log::debug!("Loading {} as {}", source, format);
        Session::new(&self.options).load_root(&text, format, Some(&source))
    }
}

/// Load a YAML string
pub fn load_yaml(text: &str, options: &LoadOptions) -> Result<Value> {
    Session::new(options).load_root(text, Format::Yaml, None)
}

/// Load a YAML file
pub fn load_yaml_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Value> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::io(format!("Failed to read {}: {}", path.display(), e))
            .with_help("Check that the file exists and is readable")
    })?;
    let source = path.to_string_lossy();
    log::debug!("Loading {}", source);
    Session::new(options).load_root(&text, Format::Yaml, Some(&source))
}

/// State of one load call
pub(crate) struct Session<'o> {
    pub(crate) options: &'o LoadOptions,
    /// Canonical locations of includes currently being resolved
    pub(crate) include_stack: Vec<String>,
    /// Canonical locations of documents whose INHERIT chain is being resolved
    pub(crate) inherit_stack: Vec<String>,
}

impl<'o> Session<'o> {
    pub(crate) fn new(options: &'o LoadOptions) -> Self {
        Self {
            options,
            include_stack: Vec::new(),
            inherit_stack: Vec::new(),
        }
    }

    /// Run every enabled pass over a top-level document
    fn load_root(&mut self, text: &str, format: Format, source: Option<&str>) -> Result<Value> {
        let mut tree = self.parse_text(text, format, source)?;

        if self.options.resolve_inherit {
            let base_dir = match source {
                Some(source) => {
                    self.inherit_stack.push(self.options.fetcher.canonical(source));
                    parent_location(source)
                }
                None => self.options.include_base_path.clone().unwrap_or_default(),
            };
            tree = inherit::resolve_inherit(self, tree, &base_dir)?;
        }

        if self.options.resolve_strings {
            tree = template::resolve_strings(
                tree,
                self.options.renderer.as_ref(),
                self.options.template_context.as_ref(),
                self.options.resolve_dict_keys,
            )?;
        }

        Ok(tree)
    }

    /// Fetch and construct a document by location, without the template pass
    pub(crate) fn load_location(&mut self, location: &str, resolve_inherit: bool) -> Result<Value> {
        let bytes = self.options.fetcher.fetch(location)?;
        let text = String::from_utf8(bytes).map_err(|_| {
            Error::format_parse("UTF-8", "document is not valid UTF-8").with_source_location(
                SourceLocation {
                    file: location.to_string(),
                    line: None,
                    column: None,
                },
            )
        })?;
        let format = Format::from_path(Path::new(location)).unwrap_or(Format::Yaml);
        let tree = self.parse_text(&text, format, Some(location))?;

        if resolve_inherit {
            inherit::resolve_inherit(self, tree, &parent_location(location))
        } else {
            Ok(tree)
        }
    }

    /// Parse text and construct the value tree
    ///
    /// Only YAML carries tags; other formats convert directly.
    pub(crate) fn parse_text(
        &mut self,
        text: &str,
        format: Format,
        source: Option<&str>,
    ) -> Result<Value> {
        match format {
            Format::Yaml => match yaml::parse(text, source)? {
                Some(root) => self.construct(root, ""),
                None => Ok(Value::Null),
            },
            other => format::parse_untagged(text, other, source),
        }
    }

    /// Convert a YAML node, resolving tags inline
    fn construct(&mut self, node: Node, path: &str) -> Result<Value> {
        if let Some(tag) = node.tag {
            let payload = Node {
                tag: None,
                kind: node.kind,
            };
            return self.dispatch_tag(&tag, payload, path);
        }

        match node.kind {
            NodeKind::Scalar { text, plain: true } => Ok(yaml::resolve_plain(&text)),
            NodeKind::Scalar { text, plain: false } => Ok(Value::String(text)),
            NodeKind::Sequence(items) => {
                let mut seq = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    seq.push(self.construct(item, &index_path(path, i))?);
                }
                Ok(Value::Sequence(seq))
            }
            NodeKind::Mapping(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.construct_key(key, path)?;
                    let child_path = key_path(path, &key);
                    let value = self.construct(value, &child_path)?;
                    map.insert(key, value);
                }
                Ok(Value::Mapping(map))
            }
        }
    }

    fn construct_key(&mut self, key: Node, path: &str) -> Result<String> {
        match self.construct(key, path)? {
            Value::String(s) => Ok(s),
            scalar @ (Value::Null | Value::Bool(_) | Value::Integer(_) | Value::Float(_)) => {
                Ok(scalar.to_string())
            }
            other => Err(Error::format_parse(
                "YAML",
                format!("mapping keys must be scalars, got {}", other.type_name()),
            )
            .with_path(path)),
        }
    }

    /// Route a tagged node to its handler
    ///
    /// `name` is the tag without its first `!`, so native tags arrive as `!str`.
    fn dispatch_tag(&mut self, name: &str, payload: Node, path: &str) -> Result<Value> {
        log::trace!("Dispatching tag !{} at '{}'", name, path);

        if name == "include" && self.options.enable_include {
            let payload = self.construct(payload, path)?;
            return include::resolve_include(self, payload, path).map_err(|e| e.with_path(path));
        }

        if name == "ENV" && self.options.enable_env {
            let payload = self.construct(payload, path)?;
            return self.resolve_env(&payload).map_err(|e| e.with_path(path));
        }

        let registry = Arc::clone(&self.options.registry);
        if let Some(handler) = registry.get(name) {
            let payload = self.construct(payload, path)?;
            return handler
                .apply(name, payload, &self.options.type_converters)
                .map_err(|e| e.with_path(path));
        }

        if let Some(native) = native_tag_name(name) {
            if !self.options.mode.allows_native(native) {
                return Err(Error::unknown_tag(format!("!{}", native))
                    .with_path(path)
                    .with_help(format!(
                        "Tag '!!{}' is not allowed in {} mode",
                        native, self.options.mode
                    )));
            }
            // Native tags read scalar text as written, before plain-scalar typing
            let payload = match payload.kind {
                NodeKind::Scalar { text, .. } => Value::String(text),
                _ => self.construct(payload, path)?,
            };
            return match construct_native(native, payload) {
                NativeOutcome::Built(value) => Ok(value),
                NativeOutcome::Invalid(message) => {
                    Err(Error::format_parse("YAML", message).with_path(path))
                }
                NativeOutcome::Unrecognized(payload) => {
                    log::warn!(
                        "Unrecognized native tag '!!{}' at '{}' kept as untagged value",
                        native,
                        path
                    );
                    Ok(payload)
                }
            };
        }

        match self.options.mode {
            SafetyMode::Unsafe => {
                log::warn!("Unknown tag '!{}' at '{}' kept as untagged value", name, path);
                self.construct(payload, path)
            }
            SafetyMode::Safe | SafetyMode::Full => {
                Err(Error::unknown_tag(name).with_path(path))
            }
        }
    }

    fn resolve_env(&self, payload: &Value) -> Result<Value> {
        let reference = EnvReference::from_value(payload)?;
        let value = reference.resolve(self.options.strict_env)?;
        if value.is_null() {
            return Ok(value);
        }
        Ok(self
            .options
            .type_converters
            .convert(FieldShape::Any, &value)
            .unwrap_or(value))
    }
}

/// Name of a native YAML tag (`!!str`, `!<tag:yaml.org,2002:str>`), given the
/// tag with one leading `!` removed
fn native_tag_name(name: &str) -> Option<&str> {
    if let Some(native) = name.strip_prefix('!') {
        return Some(native);
    }
    if let Some(native) = name.strip_prefix(YAML_TAG_PREFIX) {
        return Some(native);
    }
    name.strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .and_then(|s| s.strip_prefix(YAML_TAG_PREFIX))
}

enum NativeOutcome {
    Built(Value),
    Invalid(String),
    Unrecognized(Value),
}

fn construct_native(name: &str, payload: Value) -> NativeOutcome {
    use NativeOutcome::*;

    match (name, payload) {
        ("str", Value::Null) => Built(Value::String(String::new())),
        ("str", s @ Value::String(_)) => Built(s),
        ("str", v @ (Value::Bool(_) | Value::Integer(_) | Value::Float(_))) => {
            Built(Value::String(v.to_string()))
        }
        ("int", v @ Value::Integer(_)) => Built(v),
        ("int", Value::String(s)) => match yaml::resolve_plain(s.trim()) {
            Value::Integer(i) => Built(Value::Integer(i)),
            _ => Invalid(format!("invalid !!int value '{}'", s)),
        },
        ("float", v @ Value::Float(_)) => Built(v),
        ("float", Value::Integer(i)) => Built(Value::Float(i as f64)),
        ("float", Value::String(s)) => match yaml::resolve_plain(s.trim()) {
            Value::Float(f) => Built(Value::Float(f)),
            Value::Integer(i) => Built(Value::Float(i as f64)),
            _ => Invalid(format!("invalid !!float value '{}'", s)),
        },
        ("bool", v @ Value::Bool(_)) => Built(v),
        ("bool", Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Built(Value::Bool(true)),
            "false" => Built(Value::Bool(false)),
            _ => Invalid(format!("invalid !!bool value '{}'", s)),
        },
        ("null", Value::String(s)) if !matches!(yaml::resolve_plain(&s), Value::Null) => {
            Invalid(format!("invalid !!null value '{}'", s))
        }
        ("null", _) => Built(Value::Null),
        ("seq", v @ Value::Sequence(_)) => Built(v),
        ("map", v @ Value::Mapping(_)) => Built(v),
        ("binary", Value::String(s)) => {
            use base64::{engine::general_purpose, Engine as _};
            let compact: String = s.split_whitespace().collect();
            match general_purpose::STANDARD.decode(&compact) {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => Built(Value::String(text)),
                    Err(_) => Built(Value::String(compact)),
                },
                Err(e) => Invalid(format!("invalid !!binary value: {}", e)),
            }
        }
        ("timestamp", v @ Value::String(_)) => Built(v),
        ("set", Value::Mapping(map)) => Built(Value::Sequence(
            map.into_keys().map(Value::String).collect(),
        )),
        ("set", Value::Null) => Built(Value::Sequence(Vec::new())),
        ("omap", Value::Sequence(items)) => {
            let mut map = IndexMap::with_capacity(items.len());
            for item in items {
                match single_pair(item) {
                    Some((k, v)) => {
                        map.insert(k, v);
                    }
                    None => return Invalid("!!omap entries must be single-key mappings".into()),
                }
            }
            Built(Value::Mapping(map))
        }
        ("pairs", Value::Sequence(items)) => {
            let mut pairs = Vec::with_capacity(items.len());
            for item in items {
                match single_pair(item) {
                    Some((k, v)) => pairs.push(Value::Sequence(vec![Value::String(k), v])),
                    None => return Invalid("!!pairs entries must be single-key mappings".into()),
                }
            }
            Built(Value::Sequence(pairs))
        }
        (known, payload) if CORE_TAGS.contains(&known) || FULL_TAGS.contains(&known) => {
            Invalid(format!(
                "!!{} cannot be applied to a {} value",
                known,
                payload.type_name()
            ))
        }
        (_, payload) => Unrecognized(payload),
    }
}

fn single_pair(item: Value) -> Option<(String, Value)> {
    match item {
        Value::Mapping(map) if map.len() == 1 => map.into_iter().next(),
        _ => None,
    }
}

pub(crate) fn key_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

pub(crate) fn index_path(parent: &str, index: usize) -> String {
    format!("{}[{}]", parent, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::record::{FieldSpec, RecordSchema};
    use pretty_assertions::assert_eq;

    fn load(text: &str, options: &LoadOptions) -> Result<Value> {
        load_yaml(text, options)
    }

    #[test]
    fn test_safety_mode_from_str() {
        assert_eq!("safe".parse::<SafetyMode>().unwrap(), SafetyMode::Safe);
        assert_eq!("FULL".parse::<SafetyMode>().unwrap(), SafetyMode::Full);
        assert_eq!("unsafe".parse::<SafetyMode>().unwrap(), SafetyMode::Unsafe);
        assert!("reckless".parse::<SafetyMode>().is_err());
        assert_eq!(SafetyMode::Full.to_string(), "full");
    }

    #[test]
    fn test_default_options() {
        let options = LoadOptions::default();
        assert_eq!(options.mode, SafetyMode::Unsafe);
        assert!(options.enable_include);
        assert!(options.enable_env);
        assert!(!options.strict_env);
        assert!(!options.resolve_strings);
        assert!(!options.resolve_inherit);
        assert!(options.registry.is_empty());
    }

    #[test]
    fn test_allows_native_tiers() {
        assert!(SafetyMode::Safe.allows_native("str"));
        assert!(!SafetyMode::Safe.allows_native("binary"));
        assert!(SafetyMode::Full.allows_native("binary"));
        assert!(!SafetyMode::Full.allows_native("example.com/widget"));
        assert!(SafetyMode::Unsafe.allows_native("example.com/widget"));
    }

    #[test]
    fn test_plain_document() {
        let value = load("name: base\nsettings:\n  timeout: 30\n  ratio: 0.5\n", &LoadOptions::default())
            .unwrap();
        assert_eq!(value.get_path("name"), Some(&Value::from("base")));
        assert_eq!(value.get_path("settings.timeout"), Some(&Value::from(30)));
        assert_eq!(value.get_path("settings.ratio"), Some(&Value::from(0.5)));
    }

    #[test]
    fn test_empty_document_is_null() {
        assert_eq!(load("", &LoadOptions::default()).unwrap(), Value::Null);
    }

    #[test]
    fn test_non_string_keys_are_stringified() {
        let value = load("1: one\ntrue: yes\n", &LoadOptions::default()).unwrap();
        assert_eq!(value.get_path("1"), Some(&Value::from("one")));
        assert_eq!(value.get_path("true"), Some(&Value::from("yes")));
    }

    #[test]
    fn test_parse_error_has_location() {
        let err = load("key: [unclosed\n", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::FormatParse { .. }));
        let loc = err.source_location.unwrap();
        assert_eq!(loc.file, "<string>");
        assert!(loc.line.is_some());
    }

    #[test]
    fn test_env_tag() {
        std::env::set_var("TAGFORGE_PARSER_TEST_HOST", "db.internal");
        let value = load(
            "host: !ENV TAGFORGE_PARSER_TEST_HOST\n",
            &LoadOptions::default(),
        )
        .unwrap();
        assert_eq!(value.get_path("host"), Some(&Value::from("db.internal")));
        std::env::remove_var("TAGFORGE_PARSER_TEST_HOST");
    }

    #[test]
    fn test_env_tag_default_and_null() {
        std::env::remove_var("TAGFORGE_PARSER_TEST_UNSET");
        let value = load(
            "a: !ENV ${TAGFORGE_PARSER_TEST_UNSET:bar}\nb: !ENV TAGFORGE_PARSER_TEST_UNSET\n",
            &LoadOptions::default(),
        )
        .unwrap();
        assert_eq!(value.get_path("a"), Some(&Value::from("bar")));
        assert_eq!(value.get_path("b"), Some(&Value::Null));
    }

    #[test]
    fn test_env_tag_strict() {
        std::env::remove_var("TAGFORGE_PARSER_TEST_STRICT");
        let options = LoadOptions::default().with_strict_env(true);
        let err = load("db:\n  password: !ENV TAGFORGE_PARSER_TEST_STRICT\n", &options).unwrap_err();

        assert!(matches!(err.kind, ErrorKind::EnvVariableUnset { .. }));
        assert_eq!(err.path.as_deref(), Some("db.password"));
    }

    #[test]
    fn test_env_tag_with_type_converters() {
        std::env::set_var("TAGFORGE_PARSER_TEST_PORT", "8080");
        let options = LoadOptions::default().with_type_converters(TypeConverters::yaml_scalars());
        let value = load("port: !ENV TAGFORGE_PARSER_TEST_PORT\n", &options).unwrap();
        assert_eq!(value.get_path("port"), Some(&Value::from(8080)));
        std::env::remove_var("TAGFORGE_PARSER_TEST_PORT");
    }

    #[test]
    fn test_env_disabled_is_unknown_in_safe_mode() {
        let options = LoadOptions::default()
            .with_env(false)
            .with_mode(SafetyMode::Safe);
        let err = load("x: !ENV HOME\n", &options).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownTag { tag: "ENV".into() });
    }

    #[test]
    fn test_env_disabled_passes_through_in_unsafe_mode() {
        let options = LoadOptions::default().with_env(false);
        let value = load("x: !ENV HOME\n", &options).unwrap();
        assert_eq!(value.get_path("x"), Some(&Value::from("HOME")));
    }

    #[test]
    fn test_registered_function_tag() {
        let mut registry = TagRegistry::new();
        registry
            .register("uppercase", |v| {
                Ok(Value::String(v.as_str().unwrap_or_default().to_uppercase()))
            })
            .unwrap();
        let options = LoadOptions::default()
            .with_mode(SafetyMode::Safe)
            .with_registry(registry);

        let value = load("greeting: !uppercase hello\n", &options).unwrap();
        assert_eq!(value.get_path("greeting"), Some(&Value::from("HELLO")));
    }

    #[test]
    fn test_registered_record_tag() {
        let mut registry = TagRegistry::new();
        registry
            .register_record(
                RecordSchema::new("Person")
                    .field(FieldSpec::required("name", FieldShape::String))
                    .field(FieldSpec::required("age", FieldShape::Integer)),
                None,
            )
            .unwrap();
        let options = LoadOptions::default().with_registry(registry);

        let value = load("owner: !person {name: John, age: 30}\n", &options).unwrap();
        let record = value.get_path("owner").and_then(Value::as_record).unwrap();
        assert_eq!(record.type_name, "Person");
        assert_eq!(record.get("name"), Some(&Value::from("John")));
        assert_eq!(record.get("age"), Some(&Value::from(30)));

        let err = load("owner: !person {name: John}\n", &options).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::SchemaMismatch { .. }));
        assert_eq!(err.path.as_deref(), Some("owner"));
    }

    #[test]
    fn test_handler_sees_resolved_payload() {
        std::env::set_var("TAGFORGE_PARSER_TEST_NESTED", "inner");
        let mut registry = TagRegistry::new();
        registry
            .register("wrap", |v| {
                let mut map = IndexMap::new();
                map.insert("wrapped".to_string(), v);
                Ok(Value::Mapping(map))
            })
            .unwrap();
        let options = LoadOptions::default().with_registry(registry);

        let value = load(
            "x: !wrap\n  - !ENV TAGFORGE_PARSER_TEST_NESTED\n",
            &options,
        )
        .unwrap();
        assert_eq!(
            value.get_path("x.wrapped[0]"),
            Some(&Value::from("inner"))
        );
        std::env::remove_var("TAGFORGE_PARSER_TEST_NESTED");
    }

    #[test]
    fn test_unknown_tag_safe_vs_unsafe() {
        let text = "item: !widget {size: 3}\n";

        let err = load(text, &LoadOptions::default().with_mode(SafetyMode::Safe)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownTag { tag: "widget".into() });
        assert_eq!(err.path.as_deref(), Some("item"));

        let err = load(text, &LoadOptions::default().with_mode(SafetyMode::Full)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownTag { .. }));

        let value = load(text, &LoadOptions::default()).unwrap();
        assert_eq!(value.get_path("item.size"), Some(&Value::from(3)));
    }

    #[test]
    fn test_native_core_tags_in_safe_mode() {
        let options = LoadOptions::default().with_mode(SafetyMode::Safe);
        let value = load(
            "a: !!str 123\nb: !!float 2\nc: !!int '7'\nd: !!bool 'true'\n",
            &options,
        )
        .unwrap();
        assert_eq!(value.get_path("a"), Some(&Value::from("123")));
        assert_eq!(value.get_path("b"), Some(&Value::from(2.0)));
        assert_eq!(value.get_path("c"), Some(&Value::from(7)));
        assert_eq!(value.get_path("d"), Some(&Value::from(true)));
    }

    #[test]
    fn test_full_tags_gated_by_mode() {
        let text = "data: !!binary aGVsbG8=\n";

        let err = load(text, &LoadOptions::default().with_mode(SafetyMode::Safe)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownTag { .. }));

        let value = load(text, &LoadOptions::default().with_mode(SafetyMode::Full)).unwrap();
        assert_eq!(value.get_path("data"), Some(&Value::from("hello")));
    }

    #[test]
    fn test_omap_and_set() {
        let options = LoadOptions::default().with_mode(SafetyMode::Full);
        let value = load(
            "order: !!omap [{b: 2}, {a: 1}]\nflags: !!set {x: null, y: null}\n",
            &options,
        )
        .unwrap();

        let keys: Vec<&String> = value
            .get_path("order")
            .and_then(Value::as_mapping)
            .unwrap()
            .keys()
            .collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(value.get_path("flags"), Some(&Value::from(vec!["x", "y"])));
    }

    #[test]
    fn test_safe_mode_rejects_python_tags() {
        let options = LoadOptions::default().with_mode(SafetyMode::Safe);
        let err = load("x: !!python/object:os.system {}\n", &options).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::UnknownTag {
                tag: "!python/object:os.system".into()
            }
        );
        assert_eq!(err.path.as_deref(), Some("x"));

        let err = load(
            "x: !!python/object:os.system {}\n",
            &LoadOptions::default().with_mode(SafetyMode::Full),
        )
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownTag { .. }));
    }

    #[test]
    fn test_merge_keys() {
        let value = load(
            "base: &b {x: 1, y: 1}\nchild:\n  <<: *b\n  y: 2\n",
            &LoadOptions::default(),
        )
        .unwrap();
        assert_eq!(value.get_path("child.x"), Some(&Value::from(1)));
        assert_eq!(value.get_path("child.y"), Some(&Value::from(2)));
        assert_eq!(value.get_path("child.<<"), None);

        let value = load(
            "a: &a {k: a}\nb: &b {k: b, only_b: 1}\nc:\n  <<: [*a, *b]\n",
            &LoadOptions::default(),
        )
        .unwrap();
        assert_eq!(value.get_path("c.k"), Some(&Value::from("a")));
        assert_eq!(value.get_path("c.only_b"), Some(&Value::from(1)));
    }

    #[test]
    fn test_quoted_scalars_stay_strings() {
        let value = load("a: '123'\nb: \"true\"\nc: ! 4\nd: 4\n", &LoadOptions::default()).unwrap();
        assert_eq!(value.get_path("a"), Some(&Value::from("123")));
        assert_eq!(value.get_path("b"), Some(&Value::from("true")));
        assert_eq!(value.get_path("c"), Some(&Value::from("4")));
        assert_eq!(value.get_path("d"), Some(&Value::from(4)));
    }

    #[test]
    fn test_invalid_native_payload() {
        let err = load("n: !!int abc\n", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::FormatParse { .. }));
    }

    #[test]
    fn test_error_path_in_sequence() {
        let options = LoadOptions::default().with_mode(SafetyMode::Safe);
        let err = load("items:\n  - ok\n  - !nope x\n", &options).unwrap_err();
        assert_eq!(err.path.as_deref(), Some("items[1]"));
    }

    #[test]
    fn test_parser_reuse() {
        let parser = Parser::new(LoadOptions::default());
        assert_eq!(parser.load_str("a: 1").unwrap().get_path("a"), Some(&Value::from(1)));
        assert_eq!(parser.load_str("a: 2").unwrap().get_path("a"), Some(&Value::from(2)));
    }

    #[test]
    fn test_native_tag_name() {
        assert_eq!(native_tag_name("!str"), Some("str"));
        assert_eq!(native_tag_name("!python/object:os.system"), Some("python/object:os.system"));
        assert_eq!(native_tag_name("tag:yaml.org,2002:int"), Some("int"));
        assert_eq!(native_tag_name("<tag:yaml.org,2002:map>"), Some("map"));
        assert_eq!(native_tag_name("person"), None);
    }

    #[test]
    fn test_paths() {
        assert_eq!(key_path("", "a"), "a");
        assert_eq!(key_path("a", "b"), "a.b");
        assert_eq!(index_path("a", 2), "a[2]");
    }
}
