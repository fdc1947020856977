//! Helper (`define`) compiler (C6, spec.md §4.6).
//!
//! Converts named template blocks into hidden CUE fields, inferring an
//! `#arg` sub-schema from dot accesses in the body and propagating it back
//! into the caller's field tree at `include`/`template` call sites.

use std::collections::HashMap;

use crate::cue::control;
use crate::cue::schema::FieldTree;
use crate::cue::state::ConvertState;
use crate::error::ConvertError;
use crate::template_ast::{Arg, Block, NameExpr, Pipe, TemplateNode};

/// A compiled `define` body, ready to be spliced into the chart's helpers
/// file (spec.md §4.8 "helpers file").
#[derive(Debug, Clone)]
pub struct CompiledHelper {
    pub cue_name: String,
    /// Full `<cue_name>: ...\n` definition text.
    pub text: String,
    /// The tree of field references recorded against `#arg` while
    /// compiling the body — reused at call sites to propagate the schema
    /// into the caller's context object (spec.md §4.6 step 3).
    pub arg_tree: FieldTree,
}

/// Computes the hidden-field name for a `define` (spec.md §4.6 step 1):
/// lowercase ASCII letters and digits pass through, everything else (including
/// uppercase) becomes `_`, always prefixed with `_`.
fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    out.push('_');
    for c in name.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    out
}

/// Registers a parsed `define` body under its source name, applying the
/// duplicate-definition policy from spec.md §4.6: identical bodies dedup
/// silently, differing bodies either error (`error_on_conflicting_helpers`)
/// or let the later definition win with a warning.
pub fn register_helper(
    state: &mut ConvertState,
    name: &str,
    body: Block,
) -> Result<(), ConvertError> {
    if let Some(existing) = state.helper_sources.get(name) {
        if *existing == body {
            return Ok(());
        }
        if state.config.error_on_conflicting_helpers {
            return Err(ConvertError::ConflictingHelper(name.to_string()));
        }
        tracing::warn!(helper = name, "conflicting helper bodies; later definition wins");
    }
    state.helper_sources.insert(name.to_string(), body);
    Ok(())
}

/// Resolves `include name arg?` (spec.md §4.6 steps 3-4), used both from
/// the `include` core function and from a standalone `{{ template }}` node.
pub fn resolve_include(state: &mut ConvertState, args: &[Arg]) -> Result<String, ConvertError> {
    if args.is_empty() || args.len() > 2 {
        return Err(ConvertError::ArityMismatch {
            name: "include".to_string(),
            expected: "1 or 2".to_string(),
            actual: args.len(),
        });
    }

    let (cue_ref, static_cue_name) = match &args[0] {
        Arg::String(name) => {
            let cue_name = ensure_compiled(state, name)?;
            (cue_name.clone(), Some(cue_name))
        }
        other => {
            state.has_dynamic_include = true;
            compile_all_helpers(state)?;
            let name_expr = crate::cue::expr::translate_arg(state, other)?;
            (format!("_helpers[{}]", name_expr), None)
        }
    };

    if args.len() == 1 {
        return Ok(cue_ref);
    }

    let arg_expr = crate::cue::expr::translate_arg(state, &args[1])?;
    if let Some(cue_name) = &static_cue_name {
        let (object, path) = field_origin_of_arg(&args[1]);
        if let Some(object) = object {
            if let Some(compiled) = state.compiled_helpers.get(cue_name).cloned() {
                state.field_tree_mut(&object).merge_at(&path, &compiled.arg_tree);
            }
        }
    }
    Ok(format!("{} & {{#arg: {}, _}}", cue_ref, arg_expr))
}

/// Resolves a standalone `{{ template "name" arg? }}` node, reducing it to
/// the same call-site logic as `include`.
pub fn resolve_template_call(
    state: &mut ConvertState,
    node: &TemplateNode,
) -> Result<String, ConvertError> {
    let mut args = vec![match &node.name {
        NameExpr::Literal(s) => Arg::String(s.clone()),
        NameExpr::Dynamic(a) => (**a).clone(),
    }];
    if let Some(pipe) = &node.arg {
        args.push(pipe_to_arg(pipe));
    }
    resolve_include(state, &args)
}

fn pipe_to_arg(pipe: &Pipe) -> Arg {
    if pipe.declared_locals.is_empty() && pipe.commands.len() == 1 && pipe.commands[0].name.is_none()
    {
        pipe.commands[0].args[0].clone()
    } else {
        Arg::Pipe(Box::new(pipe.clone()))
    }
}

/// If `arg` is a bare field reference rooted at a context object, returns
/// `(object, rest_of_path)` so the included helper's `#arg` schema can be
/// grafted in at that path.
fn field_origin_of_arg(arg: &Arg) -> (Option<String>, Vec<String>) {
    if let Arg::Field(path) = arg {
        if !path.is_empty() {
            return (Some(path[0].clone()), path[1..].to_vec());
        }
    }
    (None, Vec::new())
}

/// Compiles every registered helper that hasn't been compiled yet — needed
/// once a dynamic `include` is seen, since the `_helpers` map must cover
/// every defined name (spec.md §4.6 step 4).
pub fn compile_all_helpers(state: &mut ConvertState) -> Result<(), ConvertError> {
    let names: Vec<String> = state.helper_sources.keys().cloned().collect();
    for name in names {
        ensure_compiled(state, &name)?;
    }
    Ok(())
}

/// Compiles (if not already cached) the helper registered under
/// `source_name`, returning its sanitized CUE name. A reentrant request for
/// a helper already mid-compilation (a cyclic include graph) short-circuits
/// to its name without forcing recompilation — references are by name, not
/// by owning pointer (spec.md §9 "Cyclic ownership").
fn ensure_compiled(state: &mut ConvertState, source_name: &str) -> Result<String, ConvertError> {
    let cue_name = sanitize_name(source_name);
    if state.compiled_helpers.contains_key(&cue_name) || state.compiling_helpers.contains(&cue_name)
    {
        return Ok(cue_name);
    }
    let block = state
        .helper_sources
        .get(source_name)
        .cloned()
        .ok_or_else(|| {
            ConvertError::UnsupportedConstruct(format!("helper `{}` is not defined", source_name))
        })?;

    state.compiling_helpers.insert(cue_name.clone());
    let compiled = compile_helper_body(state, &cue_name, &block)?;
    state.compiling_helpers.remove(&cue_name);
    state.compiled_helpers.insert(cue_name.clone(), compiled);
    state.use_helper(&cue_name);
    Ok(cue_name)
}

/// Compiles a single helper's body (spec.md §4.6 step 2): dot accesses are
/// tracked against a dedicated `#arg` field tree rather than any real
/// context object, recovered afterward under a private key so it never
/// leaks into the chart's `#values` schema directly.
fn compile_helper_body(
    state: &mut ConvertState,
    cue_name: &str,
    block: &Block,
) -> Result<CompiledHelper, ConvertError> {
    let virtual_key = format!("#arg#{}", cue_name);

    let saved_emitter = std::mem::take(&mut state.emitter);
    state.bindings.push(crate::cue::state::Binding {
        cue_expr: "#arg".to_string(),
        base_object: Some(virtual_key.clone()),
        base_path: Vec::new(),
    });

    let result = control::convert_block_body(state, block);
    state.emitter.flush_any_pending();
    state.emitter.close_all_frames();
    let body_text = std::mem::replace(&mut state.emitter, saved_emitter).into_inner();
    state.bindings.pop();
    result?;

    let arg_tree = state.field_trees.remove(&virtual_key).unwrap_or_default();

    // A body made of `key: value` lines is a struct; anything else (a bare
    // expression, produced when the define's whole body is a single
    // action) is emitted as-is and unified against `#arg` directly by the
    // caller, without a wrapping struct (spec.md §4.6 step 2).
    let text = if body_text.contains(": ") {
        render_struct_helper(cue_name, &arg_tree, &body_text)
    } else {
        let trimmed = body_text.trim();
        let value = if trimmed.is_empty() { "_" } else { trimmed };
        format!("{}: {}\n", cue_name, value)
    };

    Ok(CompiledHelper {
        cue_name: cue_name.to_string(),
        text,
        arg_tree,
    })
}

fn render_struct_helper(cue_name: &str, arg_tree: &FieldTree, body_text: &str) -> String {
    let arg_schema = arg_tree.emit("#arg");
    let mut out = format!("{}: {{\n", cue_name);
    for line in arg_schema.lines() {
        out.push('\t');
        out.push_str(line);
        out.push('\n');
    }
    for line in body_text.trim_end().lines() {
        out.push('\t');
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("}\n");
    out
}

/// Parse-checks each compiled helper's definition text in isolation,
/// collapsing any that fail to `<cue_name>: _` (spec.md §4.9 "Helper body
/// validation"). The helper's recorded `arg_tree` is left untouched —
/// schema propagation into call sites already happened against the Rust
/// side data, and per spec.md §3 "references to it remain valid CUE" even
/// once its body degrades to a stub.
pub fn collapse_invalid(state: &mut ConvertState, checker: &dyn crate::cue_check::CueCheck) {
    let names: Vec<String> = state.compiled_helpers.keys().cloned().collect();
    for name in names {
        let compiled = &state.compiled_helpers[&name];
        if let Err(reason) = checker.parse_check(&compiled.text) {
            tracing::warn!(helper = %name, %reason, "helper body failed validation; collapsing to `_`");
            let entry = state.compiled_helpers.get_mut(&name).unwrap();
            entry.text = format!("{}: _\n", name);
        }
    }
}

/// Renders the full set of compiled helper definitions in lexical order of
/// their *source* names (spec.md §5 ordering guarantee (a)), for splicing
/// into the chart's helpers file.
pub fn render_helper_defs(state: &ConvertState) -> String {
    let mut names: Vec<&String> = state.helper_sources.keys().collect();
    names.sort();
    let mut out = String::new();
    for name in names {
        let cue_name = sanitize_name(name);
        if let Some(compiled) = state.compiled_helpers.get(&cue_name) {
            out.push_str(&compiled.text);
        }
    }
    out
}

/// Renders the `_helpers: { "orig-name": cue_name, ... }` map used by
/// dynamic includes (spec.md §4.6 step 4). Callers should call
/// [`compile_all_helpers`] first so every definition is covered.
pub fn render_helpers_map(state: &ConvertState) -> String {
    let mut names: Vec<&String> = state.helper_sources.keys().collect();
    names.sort();
    let mut out = String::from("_helpers: {\n");
    for name in names {
        out.push('\t');
        out.push_str(&crate::cue::lexer::quote_string(name));
        out.push_str(": ");
        out.push_str(&sanitize_name(name));
        out.push('\n');
    }
    out.push_str("}\n");
    out
}

/// Convenience accessor used by tests and by [`crate::cue::chart`]: all
/// name→CompiledHelper pairs keyed by their original (unsanitized) names.
pub fn compiled_by_source_name<'a>(
    state: &'a ConvertState,
) -> HashMap<&'a str, &'a CompiledHelper> {
    state
        .helper_sources
        .keys()
        .filter_map(|name| {
            let cue_name = sanitize_name(name);
            state
                .compiled_helpers
                .get(&cue_name)
                .map(|c| (name.as_str(), c))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::template_ast::{ActionNode, Node, TextNode};

    fn state() -> ConvertState {
        ConvertState::new(ConversionConfig::helm_defaults())
    }

    fn labels_helper_block() -> Block {
        Block::new(vec![
            Node::Text(TextNode {
                text: "app: ".to_string(),
            }),
            Node::Action(ActionNode {
                pipe: Pipe::single(Arg::Field(vec!["name".to_string()])),
            }),
        ])
    }

    #[test]
    fn sanitizes_plain_lowercase_name() {
        assert_eq!(sanitize_name("labels"), "_labels");
        assert_eq!(sanitize_name("my.Helper-name"), "_my_helper_name");
    }

    #[test]
    fn identical_redefinition_is_silently_deduped() {
        let mut st = state();
        register_helper(&mut st, "labels", labels_helper_block()).unwrap();
        register_helper(&mut st, "labels", labels_helper_block()).unwrap();
        assert_eq!(st.helper_sources.len(), 1);
    }

    #[test]
    fn conflicting_redefinition_errors_when_configured() {
        let mut config = ConversionConfig::helm_defaults();
        config.error_on_conflicting_helpers = true;
        let mut st = ConvertState::new(config);
        register_helper(&mut st, "labels", labels_helper_block()).unwrap();
        let other = Block::new(vec![Node::Text(TextNode {
            text: "app: other".to_string(),
        })]);
        let err = register_helper(&mut st, "labels", other).unwrap_err();
        assert!(matches!(err, ConvertError::ConflictingHelper(_)));
    }

    #[test]
    fn include_with_struct_field_arg_propagates_schema() {
        let mut st = state();
        register_helper(&mut st, "labels", labels_helper_block()).unwrap();

        let args = vec![
            Arg::String("labels".to_string()),
            Arg::Field(vec!["Values".to_string(), "labels".to_string()]),
        ];
        let expr = resolve_include(&mut st, &args).unwrap();
        assert_eq!(expr, "_labels & {#arg: #values.labels, _}");

        let helper_text = &st.compiled_helpers["_labels"].text;
        assert!(helper_text.contains("#arg: {"));
        assert!(helper_text.contains("app: #arg.name"));

        let schema = st.field_trees["Values"].emit("#values");
        assert!(schema.contains("labels"));
        assert!(schema.contains("name"));
    }

    #[test]
    fn dynamic_include_sets_flag_and_indexes_helpers_map() {
        let mut st = state();
        register_helper(&mut st, "labels", labels_helper_block()).unwrap();
        st.local_vars.insert("name".to_string(), "\"labels\"".to_string());

        let args = vec![Arg::Variable("name".to_string(), vec![])];
        let expr = resolve_include(&mut st, &args).unwrap();
        assert!(st.has_dynamic_include);
        assert_eq!(expr, "_helpers[\"labels\"]");

        let map = render_helpers_map(&st);
        assert!(map.contains("\"labels\": _labels"));
    }

    #[test]
    fn missing_helper_is_an_error() {
        let mut st = state();
        let args = vec![Arg::String("nope".to_string())];
        assert!(resolve_include(&mut st, &args).is_err());
    }
}
