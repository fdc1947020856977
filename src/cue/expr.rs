//! Expression translator (C3, spec.md §4.3).
//!
//! Turns a value-producing AST node (`Arg`/`Pipe`) into a CUE expression
//! string, threading field references into the owning [`crate::cue::schema::FieldTree`]
//! and resolving local variables and the dot-rebinding stack.

use crate::cue::funcs;
use crate::cue::state::ConvertState;
use crate::error::ConvertError;
use crate::template_ast::{Arg, Pipe};

/// Translates a full pipe (locals declaration aside — see
/// [`crate::cue::control::handle_declaration`]) into a CUE expression,
/// chaining commands left to right through [`funcs::dispatch`].
pub fn translate_pipe(state: &mut ConvertState, pipe: &Pipe) -> Result<String, ConvertError> {
    let mut commands = pipe.commands.iter();
    let first = commands
        .next()
        .ok_or_else(|| ConvertError::InputError("empty pipe".to_string()))?;

    // The bare arg a piped chain started from, if any — threaded into the
    // first piped stage only, so e.g. `default` can recover the original
    // field path its incoming value came from (the translated expression
    // string alone doesn't carry enough to record a schema default).
    let mut source_arg: Option<&Arg> = None;
    let mut expr = match &first.name {
        None => {
            source_arg = Some(&first.args[0]);
            translate_arg(state, &first.args[0])?
        }
        Some(name) => funcs::dispatch(state, name, None, &first.args, None)?,
    };

    for cmd in commands {
        let name = cmd
            .name
            .as_ref()
            .ok_or_else(|| ConvertError::InputError("piped stage missing function name".into()))?;
        expr = funcs::dispatch(state, name, Some(expr), &cmd.args, source_arg)?;
        source_arg = None;
    }

    Ok(expr)
}

/// Translates a single argument node.
pub fn translate_arg(state: &mut ConvertState, arg: &Arg) -> Result<String, ConvertError> {
    match arg {
        Arg::Field(path) => translate_field(state, path, true),
        Arg::Variable(name, rest) => translate_variable(state, name, rest),
        Arg::String(s) => Ok(crate::cue::lexer::quote_string(s)),
        Arg::Number(n) => Ok(n.clone()),
        Arg::Bool(b) => Ok(b.to_string()),
        Arg::Nil => Ok("null".to_string()),
        Arg::Pipe(p) => translate_pipe(state, p),
    }
}

/// Resolves a `.A.b.c`-style field path. `required` marks whether this
/// access counts as a value use (vs. only a truthiness condition, spec.md
/// §3 "required" flag) — condition dispatch in [`crate::cue::funcs`] calls
/// this with `required = false`.
pub fn translate_field(
    state: &mut ConvertState,
    path: &[String],
    required: bool,
) -> Result<String, ConvertError> {
    if path.is_empty() {
        return translate_dot(state);
    }

    if let Some(binding) = state.bindings.last().cloned() {
        let expr = join_path(&binding.cue_expr, path);
        if let Some(obj) = &binding.base_object {
            let mut full_path = binding.base_path.clone();
            full_path.extend(path.iter().cloned());
            state
                .field_tree_mut(obj)
                .record_ref(&full_path, required, false);
        }
        return Ok(expr);
    }

    let head = &path[0];
    if let Some(def) = state.config.context_def(head).map(str::to_string) {
        let rest = &path[1..];
        state.field_tree_mut(head).record_ref(rest, required, false);
        return Ok(join_path(&def, rest));
    }

    Err(ConvertError::UnsupportedConstruct(format!(
        "field access `.{}` has no configured context object and no range/with binding is active",
        path.join(".")
    )))
}

/// Resolves a bare `.` — the top of the range/with binding stack, else the
/// configured `root_expr`, else an error (spec.md §3 invariant).
pub fn translate_dot(state: &mut ConvertState) -> Result<String, ConvertError> {
    if let Some(binding) = state.bindings.last() {
        return Ok(binding.cue_expr.clone());
    }
    if let Some(root) = &state.config.root_expr {
        return Ok(root.clone());
    }
    Err(ConvertError::UnsupportedConstruct(
        "bare `.` outside any range/with with no configured root expression".to_string(),
    ))
}

/// Resolves `$name.rest…`. An empty `name` means the variable was a bare
/// `$` (spec.md §4.3: "`#a.b.c` if `x` is `$` + context") — Helm's idiom for
/// reaching root scope from inside a `range`/`with` rebinding — so `rest`'s
/// head is itself a context object name, resolved the same way a `.`-rooted
/// field access is. A named variable instead looks up its bound CUE
/// expression in `local_vars`.
fn translate_variable(
    state: &mut ConvertState,
    name: &str,
    rest: &[String],
) -> Result<String, ConvertError> {
    if name.is_empty() {
        if rest.is_empty() {
            return Err(ConvertError::UnsupportedConstruct(
                "bare `$` root reference needs at least one field after it".to_string(),
            ));
        }
        return translate_field(state, rest, true);
    }

    let base = state
        .local_vars
        .get(name)
        .cloned()
        .ok_or_else(|| ConvertError::UnsupportedConstruct(format!("unbound variable `${}`", name)))?;
    Ok(join_path(&base, rest))
}

fn join_path(base: &str, path: &[String]) -> String {
    let mut out = base.to_string();
    for seg in path {
        out.push('.');
        out.push_str(&crate::cue::lexer::cue_key(seg));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::template_ast::{Command, Pipe};

    fn state() -> ConvertState {
        ConvertState::new(ConversionConfig::helm_defaults())
    }

    #[test]
    fn translates_context_object_field() {
        let mut st = state();
        let expr = translate_field(&mut st, &["Values".into(), "port".into()], true).unwrap();
        assert_eq!(expr, "#values.port");
        assert!(st.field_trees["Values"].emit("#values").contains("port"));
    }

    #[test]
    fn bare_dot_uses_root_expr_when_configured() {
        let mut st = ConvertState::new(ConversionConfig::helm_defaults().with_root_expr("#values"));
        assert_eq!(translate_dot(&mut st).unwrap(), "#values");
    }

    #[test]
    fn bare_dot_errors_without_binding_or_root() {
        let mut st = state();
        assert!(translate_dot(&mut st).is_err());
    }

    #[test]
    fn literal_args_translate_directly() {
        let mut st = state();
        assert_eq!(translate_arg(&mut st, &Arg::Number("8080".into())).unwrap(), "8080");
        assert_eq!(translate_arg(&mut st, &Arg::Bool(true)).unwrap(), "true");
        assert_eq!(translate_arg(&mut st, &Arg::Nil).unwrap(), "null");
        assert_eq!(
            translate_arg(&mut st, &Arg::String("hi".into())).unwrap(),
            "\"hi\""
        );
    }

    #[test]
    fn bare_value_pipe_recurses_into_sole_arg() {
        let mut st = state();
        let pipe = Pipe {
            declared_locals: vec![],
            commands: vec![Command {
                name: None,
                args: vec![Arg::Field(vec!["Values".into(), "x".into()])],
            }],
        };
        assert_eq!(translate_pipe(&mut st, &pipe).unwrap(), "#values.x");
    }

    #[test]
    fn bare_dollar_root_reference_resolves_through_context_def() {
        let mut st = state();
        let expr = translate_variable(&mut st, "", &["Release".into(), "Name".into()]).unwrap();
        assert_eq!(expr, "#release.Name");
        assert!(st.field_trees["Release"].emit("#release").contains("Name"));
    }

    #[test]
    fn bare_dollar_alone_is_an_error() {
        let mut st = state();
        assert!(translate_variable(&mut st, "", &[]).is_err());
    }

    #[test]
    fn named_variable_aliases_local_vars() {
        let mut st = state();
        st.local_vars.insert("v".to_string(), "#values.name".to_string());
        let expr = translate_variable(&mut st, "v", &["suffix".into()]).unwrap();
        assert_eq!(expr, "#values.name.suffix");
    }
}
