//! Per-conversion state threaded through C3-C6: local variables, the
//! range/with binding stack, per-context-object field trees, and the
//! import/helper usage bags that feed C8's chart-level merge.

use std::collections::{BTreeSet, HashMap};

use crate::config::ConversionConfig;
use crate::cue::frame::Emitter;
use crate::cue::helpers::CompiledHelper;
use crate::cue::schema::FieldTree;
use crate::template_ast::Block;

/// One entry in the range/with binding stack (spec.md §3 "Range/with
/// binding").
#[derive(Debug, Clone)]
pub struct Binding {
    /// The CUE expression dot currently resolves to.
    pub cue_expr: String,
    /// The context object this binding's source field was rooted at, if
    /// any, so nested accesses are tracked back into that object's schema.
    pub base_object: Option<String>,
    /// The field path (relative to `base_object`) that produced this
    /// binding, so sub-accesses compose the full path.
    pub base_path: Vec<String>,
}

/// All per-template conversion state.
pub struct ConvertState {
    pub config: ConversionConfig,
    pub emitter: Emitter,
    pub local_vars: HashMap<String, String>,
    pub bindings: Vec<Binding>,
    pub field_trees: HashMap<String, FieldTree>,
    pub defaults_recorded: BTreeSet<String>,
    pub imports: BTreeSet<String>,
    pub used_helpers: BTreeSet<String>,
    pub needs_nonzero: bool,
    pub has_dynamic_include: bool,
    /// Generated-name counter for range loop variables (`_key<i>`/`_val<i>`,
    /// spec.md §4.5).
    pub range_counter: usize,
    /// Raw parsed `define` bodies, keyed by their original template name
    /// (spec.md §4.6 "Register" — shared, read-only once populated; see
    /// [`crate::cue::helpers::register_helper`]).
    pub helper_sources: HashMap<String, Block>,
    /// Compiled helper definitions, keyed by sanitized CUE name. Filled
    /// lazily on first `include`/`template` reference.
    pub compiled_helpers: HashMap<String, CompiledHelper>,
    /// Sanitized names currently being compiled, guarding against infinite
    /// recursion through a cyclic helper-include graph (spec.md §9 "Cyclic
    /// ownership").
    pub compiling_helpers: BTreeSet<String>,
}

impl ConvertState {
    pub fn new(config: ConversionConfig) -> Self {
        Self {
            config,
            emitter: Emitter::new(),
            local_vars: HashMap::new(),
            bindings: Vec::new(),
            field_trees: HashMap::new(),
            defaults_recorded: BTreeSet::new(),
            imports: BTreeSet::new(),
            used_helpers: BTreeSet::new(),
            needs_nonzero: false,
            has_dynamic_include: false,
            range_counter: 0,
            helper_sources: HashMap::new(),
            compiled_helpers: HashMap::new(),
            compiling_helpers: BTreeSet::new(),
        }
    }

    pub fn field_tree_mut(&mut self, object: &str) -> &mut FieldTree {
        self.field_trees.entry(object.to_string()).or_default()
    }

    /// Generates the next `_range<i>` value-binding name for a `range`
    /// translation. The loop key is always `_` (spec.md §8 scenario 4):
    /// the AST doesn't distinguish list vs. map ranges, and a single
    /// generated value name covers both without colliding with user
    /// variables.
    pub fn next_range_name(&mut self) -> String {
        let i = self.range_counter;
        self.range_counter += 1;
        format!("_range{}", i)
    }

    pub fn add_import(&mut self, import: &str) {
        self.imports.insert(import.to_string());
    }

    pub fn use_helper(&mut self, name: &str) {
        self.used_helpers.insert(name.to_string());
    }
}
