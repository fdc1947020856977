//! Conversion configuration (spec.md §6).
//!
//! Mirrors the teacher's `lang_config::LanguageConfig`: a `serde`-deserializable
//! struct, optionally loaded from TOML, with a default constructed when no file
//! is present.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// A single configurable pipeline function (spec.md §4.4 "Configurable
/// pipeline functions").
///
/// `convert` is not itself deserializable — TOML configs register functions
/// by name against a fixed catalog of Sprig-equivalent templates baked into
/// [`crate::cue::funcs`]; this struct only carries the caller-controllable
/// knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineFnSpec {
    /// Number of explicit (non-piped) arguments this function takes.
    #[serde(default)]
    pub n_explicit_args: usize,
    /// CUE package imports this function's expansion requires.
    #[serde(default)]
    pub imports: Vec<String>,
    /// Names of helper definitions (`_trunc`, `_last`, …) this function's
    /// expansion references.
    #[serde(default)]
    pub helpers: Vec<String>,
    /// Whether this function may appear in first-command (non-piped)
    /// position with zero explicit args, e.g. `fn .Foo`.
    #[serde(default)]
    pub passthrough: bool,
    /// Whether feeding a field through this function marks it non-scalar
    /// in the inferred schema (spec.md §4.4 "non_scalar").
    #[serde(default)]
    pub non_scalar: bool,
}

/// The conversion configuration (spec.md §6 "Input (c)").
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversionConfig {
    /// External template name -> CUE hidden-definition name, e.g.
    /// `"Values" -> "#values"`.
    #[serde(default)]
    pub context_objects: HashMap<String, String>,

    /// Configurable pipeline functions, keyed by the name they are invoked
    /// under in the source template.
    #[serde(default)]
    pub funcs: HashMap<String, PipelineFnSpec>,

    /// If set, only the listed core-handled function names are enabled;
    /// everything else core-handled raises `UnsupportedFunction { restricted: true }`.
    #[serde(default)]
    pub core_funcs: Option<Vec<String>>,

    /// CUE expression substituted for a bare `.` with no enclosing
    /// range/with binding. If unset, bare top-level dot is a conversion
    /// error (spec.md §3 invariants).
    #[serde(default)]
    pub root_expr: Option<String>,

    /// When duplicate helper definitions across files have differing
    /// bodies: if true, raise `ConflictingHelper`; if false, keep the
    /// later definition and log a warning (spec.md §4.6).
    #[serde(default)]
    pub error_on_conflicting_helpers: bool,
}

impl ConversionConfig {
    /// The Helm defaults: `Values`/`Release`/`Chart`/`Capabilities`/`Template`/`Files`.
    pub fn helm_defaults() -> Self {
        let mut context_objects = HashMap::new();
        for (name, def) in [
            ("Values", "#values"),
            ("Release", "#release"),
            ("Chart", "#chart"),
            ("Capabilities", "#capabilities"),
            ("Template", "#template"),
            ("Files", "#files"),
        ] {
            context_objects.insert(name.to_string(), def.to_string());
        }
        Self {
            context_objects,
            ..Default::default()
        }
    }

    pub fn with_root_expr(mut self, expr: impl Into<String>) -> Self {
        self.root_expr = Some(expr.into());
        self
    }

    /// Loads a configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// The CUE definition name for an external context object name, if any
    /// is configured.
    pub fn context_def(&self, name: &str) -> Option<&str> {
        self.context_objects.get(name).map(String::as_str)
    }

    /// Whether `name` is enabled as a core-handled function, per the
    /// optional `core_funcs` allow-list.
    pub fn core_func_enabled(&self, name: &str) -> bool {
        match &self.core_funcs {
            None => true,
            Some(allowed) => allowed.iter().any(|n| n == name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn helm_defaults_maps_values() {
        let cfg = ConversionConfig::helm_defaults();
        assert_eq!(cfg.context_def("Values"), Some("#values"));
        assert_eq!(cfg.context_def("Unknown"), None);
    }

    #[test]
    fn core_func_enabled_defaults_to_true() {
        let cfg = ConversionConfig::default();
        assert!(cfg.core_func_enabled("default"));
    }

    #[test]
    fn core_func_allow_list_restricts() {
        let mut cfg = ConversionConfig::default();
        cfg.core_funcs = Some(vec!["default".to_string()]);
        assert!(cfg.core_func_enabled("default"));
        assert!(!cfg.core_func_enabled("tpl"));
    }

    #[test]
    fn load_from_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
root_expr = "#values"

[context_objects]
Values = "#values"

[funcs.upper]
imports = ["strings"]
"#
        )
        .unwrap();

        let cfg = ConversionConfig::load(file.path()).unwrap();
        assert_eq!(cfg.root_expr.as_deref(), Some("#values"));
        assert_eq!(cfg.context_def("Values"), Some("#values"));
        assert_eq!(cfg.funcs["upper"].imports, vec!["strings".to_string()]);
    }

    #[test]
    fn load_missing_file_errors() {
        let err = ConversionConfig::load(Path::new("/nonexistent/helm2cue.toml"));
        assert!(matches!(err, Err(ConfigError::Io(_, _))));
    }
}
