//! Error taxonomy for the template-to-CUE conversion (spec §7).
//!
//! Mirrors the teacher's split between a `thiserror`-derived enum for
//! structurally-distinguishable failures (`AstBuildError`, `ValidationError`
//! in the teacher) and a manually-`Display`ed enum for I/O-carrying config
//! errors (`lang_config::ConfigError`).

use std::path::PathBuf;
use thiserror::Error;

/// A single structured conversion error, as described in spec.md §7.
///
/// Each variant carries enough context (template name, offending
/// construct/function name) to locate the failure in a warning log, per the
/// "user-visible behavior" requirement in spec.md §7.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// The input template failed to parse, was empty, or some other
    /// caller-side precondition was violated (e.g. malformed `Chart.yaml`).
    #[error("{0}")]
    InputError(String),

    /// A function was invoked in a position with no CUE mapping.
    #[error("unsupported pipeline function `{name}`")]
    UnsupportedFunction { name: String },

    /// The function exists but was excluded by the caller's `core_funcs`
    /// allow-list (spec.md §4.4).
    #[error("unsupported pipeline function `{name}` (not a builtin)")]
    RestrictedFunction { name: String },

    /// Explicit argument count disagreed with the function's signature.
    #[error("`{name}` expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        name: String,
        expected: String,
        actual: usize,
    },

    /// An AST shape the core does not recognize in its current context
    /// (e.g. bare `.` outside any range/with with no configured root).
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),

    /// Emitted CUE failed the parse-check (template body) or compile-check
    /// (helper body) described in spec.md §4.9.
    #[error("emitted CUE failed validation: {0}")]
    InvalidOutput(String),

    /// Two different bodies were registered for the same helper name and
    /// the caller's chart configuration does not permit silent/warned
    /// resolution (spec.md §4.6 "Duplicate definitions").
    #[error("conflicting definitions for helper `{0}`")]
    ConflictingHelper(String),
}

/// Wraps a [`ConvertError`] with the template file name it occurred in, for
/// chart-mode warning logs (spec.md §7's per-template error reporting).
#[derive(Debug, Clone)]
pub struct TemplateError {
    pub template: String,
    pub error: ConvertError,
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.template, self.error)
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Errors loading a [`crate::config::ConversionConfig`] from TOML.
///
/// Kept as a manually-`Display`ed enum (not `thiserror`) following the
/// teacher's `lang_config::ConfigError`, since both variants need to carry
/// the source path alongside a foreign error type.
#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::Parse(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(_, e) => Some(e),
            ConfigError::Parse(_, e) => Some(e),
        }
    }
}
