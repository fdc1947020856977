//! Function dispatcher (C4, spec.md §4.4).
//!
//! Three dispatch surfaces: core-handled functions with bespoke CUE
//! construction, the configurable catalog of Sprig-equivalent pipeline
//! functions, and the condition dispatch used by `if`/`with` guards
//! (handled separately in [`dispatch_condition`], called from
//! [`crate::cue::control`]).

use crate::cue::expr;
use crate::cue::lexer;
use crate::cue::state::ConvertState;
use crate::error::ConvertError;
use crate::template_ast::{Arg, Pipe};

const CORE_HANDLED: &[&str] = &[
    "default", "required", "printf", "print", "include", "ternary", "list", "dict", "get",
    "coalesce", "min", "max", "tpl", "merge", "mergeOverwrite", "set", "lookup",
];

/// General value-position dispatch, used by [`expr::translate_pipe`] for
/// both first-command calls (`incoming = None`) and piped stages
/// (`incoming = Some(prior_expr)`).
pub fn dispatch(
    state: &mut ConvertState,
    name: &str,
    incoming: Option<String>,
    args: &[Arg],
    source_arg: Option<&Arg>,
) -> Result<String, ConvertError> {
    if CORE_HANDLED.contains(&name) {
        if !state.config.core_func_enabled(name) {
            return Err(ConvertError::RestrictedFunction {
                name: name.to_string(),
            });
        }
        return dispatch_core(state, name, incoming, args, source_arg);
    }

    dispatch_pipeline(state, name, incoming, args)
}

fn eval_all(state: &mut ConvertState, args: &[Arg]) -> Result<Vec<String>, ConvertError> {
    args.iter().map(|a| expr::translate_arg(state, a)).collect()
}

fn dispatch_core(
    state: &mut ConvertState,
    name: &str,
    incoming: Option<String>,
    args: &[Arg],
    source_arg: Option<&Arg>,
) -> Result<String, ConvertError> {
    match name {
        "default" => core_default(state, incoming, args, source_arg),
        "required" => core_required(state, incoming, args),
        "printf" => core_printf(state, args),
        "print" => core_print(state, args),
        "include" => core_include(state, incoming, args),
        "ternary" => core_ternary(state, args),
        "list" => {
            let items = eval_all(state, args)?;
            Ok(format!("[{}]", items.join(", ")))
        }
        "dict" => core_dict(state, args),
        "get" => core_get(state, incoming, args),
        "coalesce" => core_coalesce(state, incoming, args),
        "min" => core_min_max(state, incoming, args, "list.Min"),
        "max" => core_min_max(state, incoming, args, "list.Max"),
        "tpl" => core_tpl(state, args),
        "merge" | "mergeOverwrite" => Err(ConvertError::UnsupportedConstruct(format!(
            "`{}` has no static equivalent: CUE unification already expresses merging structs",
            name
        ))),
        "set" | "lookup" => Err(ConvertError::UnsupportedConstruct(format!(
            "`{}` has no static equivalent",
            name
        ))),
        _ => unreachable!("not in CORE_HANDLED"),
    }
}

/// `default(v, field)` or, piped, `field | default v`.
fn core_default(
    state: &mut ConvertState,
    incoming: Option<String>,
    args: &[Arg],
    source_arg: Option<&Arg>,
) -> Result<String, ConvertError> {
    let (value_arg, field_expr, field_arg) = match incoming {
        Some(field_expr) => (
            args.first()
                .ok_or_else(|| arity_err("default", "1", args.len()))?,
            field_expr,
            source_arg,
        ),
        None => {
            if args.len() != 2 {
                return Err(arity_err("default", "2", args.len()));
            }
            let field_expr = expr::translate_arg(state, &args[1])?;
            (&args[0], field_expr, Some(&args[1]))
        }
    };

    if let Some(path) = field_arg.and_then(field_path_of) {
        let literal = literal_cue(state, value_arg)?;
        record_default_for_expr(state, &path, &literal);
    }

    Ok(field_expr)
}

/// Recovers the `(object, path)` a field access came from, so `default` can
/// record it in the schema — recomputed from the arg that produced the
/// incoming value directly, rather than from its already-translated
/// expression string.
fn field_path_of(arg: &Arg) -> Option<(String, Vec<String>)> {
    if let Arg::Field(path) = arg {
        if !path.is_empty() {
            return Some((path[0].clone(), path[1..].to_vec()));
        }
    }
    None
}

fn record_default_for_expr(state: &mut ConvertState, path: &(String, Vec<String>), literal: &str) {
    state.field_tree_mut(&path.0).record_default(&path.1, literal);
}

/// Resolves `value_arg` to a CUE literal for use in a schema default. Per
/// spec.md §9 Open Questions, only literal and field-reference fallbacks are
/// supported; anything else is translated as a plain expression (degrading
/// rather than eagerly evaluating it), per the recorded design decision.
fn literal_cue(state: &mut ConvertState, value_arg: &Arg) -> Result<String, ConvertError> {
    expr::translate_arg(state, value_arg)
}

/// `required(msg, field)`.
fn core_required(
    state: &mut ConvertState,
    incoming: Option<String>,
    args: &[Arg],
) -> Result<String, ConvertError> {
    let (msg, field_expr) = match incoming {
        Some(field_expr) => {
            let msg = args
                .first()
                .ok_or_else(|| arity_err("required", "1", args.len()))?;
            (expr::translate_arg(state, msg)?, field_expr)
        }
        None => {
            if args.len() != 2 {
                return Err(arity_err("required", "2", args.len()));
            }
            (
                expr::translate_arg(state, &args[0])?,
                expr::translate_arg(state, &args[1])?,
            )
        }
    };
    Ok(format!("{} // required: {}", field_expr, msg))
}

/// `printf(fmt, args…)` — supports `%s`, `%d`, `%v`, `%%`.
fn core_printf(state: &mut ConvertState, args: &[Arg]) -> Result<String, ConvertError> {
    let fmt_arg = args
        .first()
        .ok_or_else(|| ConvertError::ArityMismatch {
            name: "printf".to_string(),
            expected: "at least 1".to_string(),
            actual: args.len(),
        })?;
    let fmt = match fmt_arg {
        Arg::String(s) => s.clone(),
        _ => {
            return Err(ConvertError::UnsupportedConstruct(
                "`printf` requires a literal format string".to_string(),
            ))
        }
    };

    let value_args = &args[1..];
    let mut values = value_args.iter();
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();
    let mut used = 0usize;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push_str(&lexer::escape_for_interpolation(&c.to_string()));
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') | Some('d') | Some('v') => {
                let arg = values.next().ok_or_else(|| ConvertError::ArityMismatch {
                    name: "printf".to_string(),
                    expected: format!("{} value argument(s) for format", value_args.len() + 1),
                    actual: used,
                })?;
                let e = expr::translate_arg(state, arg)?;
                out.push_str("\\(");
                out.push_str(&e);
                out.push(')');
                used += 1;
            }
            Some(other) => {
                return Err(ConvertError::UnsupportedConstruct(format!(
                    "unsupported printf verb `%{}`",
                    other
                )))
            }
            None => {
                return Err(ConvertError::InputError(
                    "`printf` format string ends with a bare `%`".to_string(),
                ))
            }
        }
    }

    if used != value_args.len() {
        return Err(ConvertError::ArityMismatch {
            name: "printf".to_string(),
            expected: format!("{}", used),
            actual: value_args.len(),
        });
    }

    Ok(format!("\"{}\"", out))
}

/// `print(args…)` — concatenates literal strings and `\(expr)` for others.
fn core_print(state: &mut ConvertState, args: &[Arg]) -> Result<String, ConvertError> {
    let mut out = String::new();
    for a in args {
        match a {
            Arg::String(s) => out.push_str(&lexer::escape_for_interpolation(s)),
            other => {
                let e = expr::translate_arg(state, other)?;
                out.push_str("\\(");
                out.push_str(&e);
                out.push(')');
            }
        }
    }
    Ok(format!("\"{}\"", out))
}

fn core_include(
    state: &mut ConvertState,
    incoming: Option<String>,
    args: &[Arg],
) -> Result<String, ConvertError> {
    if incoming.is_some() {
        return Err(ConvertError::UnsupportedConstruct(
            "`include` cannot appear in piped position".to_string(),
        ));
    }
    crate::cue::helpers::resolve_include(state, args)
}

fn core_ternary(state: &mut ConvertState, args: &[Arg]) -> Result<String, ConvertError> {
    if args.len() != 3 {
        return Err(arity_err("ternary", "3", args.len()));
    }
    let a = expr::translate_arg(state, &args[0])?;
    let b = expr::translate_arg(state, &args[1])?;
    let (cond, _) = crate::cue::control::pipe_to_cue_cond_arg(state, &args[2])?;
    Ok(format!("[if {} {{{}}}, {}][0]", cond, a, b))
}

fn core_dict(state: &mut ConvertState, args: &[Arg]) -> Result<String, ConvertError> {
    if args.len() % 2 != 0 {
        return Err(ConvertError::ArityMismatch {
            name: "dict".to_string(),
            expected: "an even number of".to_string(),
            actual: args.len(),
        });
    }
    let mut parts = Vec::new();
    for pair in args.chunks(2) {
        let key = match &pair[0] {
            Arg::String(s) => s.clone(),
            _ => {
                return Err(ConvertError::UnsupportedConstruct(
                    "`dict` keys must be string literals".to_string(),
                ))
            }
        };
        let value = expr::translate_arg(state, &pair[1])?;
        parts.push(format!("{}: {}", lexer::cue_key(&key), value));
    }
    Ok(format!("{{{}}}", parts.join(", ")))
}

fn core_get(
    state: &mut ConvertState,
    incoming: Option<String>,
    args: &[Arg],
) -> Result<String, ConvertError> {
    let (m, k) = match incoming {
        Some(m) => (
            m,
            args.first().ok_or_else(|| arity_err("get", "1", args.len()))?,
        ),
        None => {
            if args.len() != 2 {
                return Err(arity_err("get", "2", args.len()));
            }
            (expr::translate_arg(state, &args[0])?, &args[1])
        }
    };
    match k {
        Arg::String(s) if is_bare_ident(s) => Ok(format!("{}.{}", m, s)),
        Arg::String(s) => Ok(format!("{}[{}]", m, lexer::quote_string(s))),
        other => {
            let ke = expr::translate_arg(state, other)?;
            Ok(format!("{}[{}]", m, ke))
        }
    }
}

fn is_bare_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn core_coalesce(
    state: &mut ConvertState,
    incoming: Option<String>,
    args: &[Arg],
) -> Result<String, ConvertError> {
    let mut exprs = Vec::new();
    if let Some(e) = incoming {
        exprs.push(e);
    }
    for a in args {
        exprs.push(expr::translate_arg(state, a)?);
    }
    if exprs.is_empty() {
        return Err(arity_err("coalesce", "at least 1", 0));
    }
    state.needs_nonzero = true;
    let last = exprs.pop().unwrap();
    let guarded: Vec<String> = exprs
        .iter()
        .map(|e| format!("if (_nonzero & {{#arg: {}, _}}) {{{}}}", e, e))
        .collect();
    let mut all = guarded;
    all.push(last);
    Ok(format!("[{}][0]", all.join(", ")))
}

fn core_min_max(
    state: &mut ConvertState,
    incoming: Option<String>,
    args: &[Arg],
    func: &str,
) -> Result<String, ConvertError> {
    let mut exprs = Vec::new();
    if let Some(e) = incoming {
        exprs.push(e);
    }
    exprs.extend(eval_all(state, args)?);
    state.add_import("list");
    Ok(format!("{}([{}])", func, exprs.join(", ")))
}

fn core_tpl(state: &mut ConvertState, args: &[Arg]) -> Result<String, ConvertError> {
    if args.len() != 2 {
        return Err(arity_err("tpl", "2", args.len()));
    }
    let tmpl = expr::translate_arg(state, &args[0])?;
    let _ctx = expr::translate_arg(state, &args[1])?;
    state.add_import("encoding/yaml");
    Ok(format!(
        "yaml.Unmarshal(template.Execute({}, _tplContext))",
        tmpl
    ))
}

fn arity_err(name: &str, expected: &str, actual: usize) -> ConvertError {
    ConvertError::ArityMismatch {
        name: name.to_string(),
        expected: expected.to_string(),
        actual,
    }
}

fn dispatch_pipeline(
    state: &mut ConvertState,
    name: &str,
    incoming: Option<String>,
    args: &[Arg],
) -> Result<String, ConvertError> {
    // No-op passthrough functions: CUE's typeless emission already carries
    // the right shape, so these translate to the identity.
    const PASSTHROUGH: &[&str] = &[
        "toYaml", "toJson", "fromYaml", "fromJson", "nindent", "indent", "toString",
    ];
    if PASSTHROUGH.contains(&name) {
        return match incoming {
            Some(e) => Ok(e),
            None => {
                let a = args
                    .first()
                    .ok_or_else(|| arity_err(name, "1", args.len()))?;
                expr::translate_arg(state, a)
            }
        };
    }

    let expr_in = match incoming {
        Some(e) => e,
        None => {
            let a = args
                .first()
                .ok_or_else(|| ConvertError::UnsupportedFunction {
                    name: name.to_string(),
                })?;
            expr::translate_arg(state, a)?
        }
    };
    let explicit: &[Arg] = if incoming.is_some() { args } else { &args[1..] };
    let explicit_vals = eval_all(state, explicit)?;

    let result = match name {
        "quote" => Some(format!("\"\\({})\"", expr_in)),
        "upper" => {
            state.add_import("strings");
            Some(format!("strings.ToUpper({})", expr_in))
        }
        "lower" => {
            state.add_import("strings");
            Some(format!("strings.ToLower({})", expr_in))
        }
        "trimSuffix" => {
            state.add_import("strings");
            require_args(name, &explicit_vals, 1)?;
            Some(format!(
                "strings.TrimSuffix({}, {})",
                expr_in, explicit_vals[0]
            ))
        }
        "trimPrefix" => {
            state.add_import("strings");
            require_args(name, &explicit_vals, 1)?;
            Some(format!(
                "strings.TrimPrefix({}, {})",
                expr_in, explicit_vals[0]
            ))
        }
        "trunc" => {
            require_args(name, &explicit_vals, 1)?;
            state.add_import("strings");
            state.use_helper("_trunc");
            Some(format!(
                "(_trunc & {{#in: {}, #n: {}}}).out",
                expr_in, explicit_vals[0]
            ))
        }
        "b64enc" => {
            state.add_import("encoding/base64");
            Some(format!("base64.Encode(null, {})", expr_in))
        }
        "join" => {
            state.add_import("strings");
            require_args(name, &explicit_vals, 1)?;
            Some(format!("strings.Join({}, {})", expr_in, explicit_vals[0]))
        }
        "sha256sum" => {
            state.add_import("crypto/sha256");
            state.add_import("encoding/hex");
            Some(format!("hex.Encode(sha256.Sum256({}))", expr_in))
        }
        "int" => Some(format!("int & {}", expr_in)),
        "last" => {
            state.use_helper("_last");
            Some(format!("(_last & {{#in: {}}}).out", expr_in))
        }
        "uniq" => {
            state.add_import("list");
            state.use_helper("_uniq");
            Some(format!("(_uniq & {{#in: {}}}).out", expr_in))
        }
        "compact" => {
            state.use_helper("_compact");
            Some(format!("(_compact & {{#in: {}}}).out", expr_in))
        }
        _ => None,
    };

    match result {
        Some(cue) => Ok(cue),
        None => Err(ConvertError::UnsupportedFunction {
            name: name.to_string(),
        }),
    }
}

fn require_args(name: &str, vals: &[String], n: usize) -> Result<(), ConvertError> {
    if vals.len() != n {
        return Err(arity_err(name, &n.to_string(), vals.len()));
    }
    Ok(())
}

/// `_nonzero` helper body (spec.md §4.4 "_nonzero helper"): truthiness
/// dispatch by which unification with a concrete zero value succeeds.
pub const NONZERO_HELPER: &str = r#"_nonzero: {
	#arg: _
	out: bool | *true
	if #arg == 0 || #arg == 0.0 || #arg == "" || #arg == false || #arg == [] || #arg == {} {
		out: false
	}
}
"#;

/// `_trunc`/`_last`/`_uniq`/`_compact`/`_semverCompare` helper bodies, pulled
/// into the chart's helpers file whenever [`ConvertState::use_helper`]
/// records their use (spec.md §4.8 "helpers file").
pub const TRUNC_HELPER: &str = r#"_trunc: {
	#in:  string
	#n:   int
	out:  string
	if #n >= 0 {
		out: strings.Slice(#in, 0, #n)
	}
	if #n < 0 {
		out: strings.Slice(#in, len(#in)+#n, len(#in))
	}
}
"#;

pub const LAST_HELPER: &str = r#"_last: {
	#in: [...]
	out: #in[len(#in)-1]
}
"#;

pub const UNIQ_HELPER: &str = r#"_uniq: {
	#in:  [...]
	out:  list.UniqueItems(#in)
}
"#;

pub const COMPACT_HELPER: &str = r#"_compact: {
	#in: [...]
	out: [ for v in #in if v != _|_ && v != "" && v != null {v} ]
}
"#;

pub const SEMVER_COMPARE_HELPER: &str = r#"_semverCompare: {
	#constraint: string
	#version:    string
	out:         semver.Matches(#version, #constraint)
}
"#;

/// Looks up the literal CUE body for a core helper by name (spec.md §4.8
/// "any used helper defs"), used when assembling the chart's helpers file.
pub fn builtin_helper_source(name: &str) -> Option<&'static str> {
    match name {
        "_nonzero" => Some(NONZERO_HELPER),
        "_trunc" => Some(TRUNC_HELPER),
        "_last" => Some(LAST_HELPER),
        "_uniq" => Some(UNIQ_HELPER),
        "_compact" => Some(COMPACT_HELPER),
        "_semverCompare" => Some(SEMVER_COMPARE_HELPER),
        _ => None,
    }
}

/// Reports whether `pipe` is exactly a single `semverCompare` call, handled
/// by [`crate::cue::control::pipe_to_cue_cond`] specially.
pub fn is_semver_compare(pipe: &Pipe) -> bool {
    pipe.commands.len() == 1
        && pipe.commands[0].name.as_deref() == Some("semverCompare")
}

pub fn semver_compare_cue(state: &mut ConvertState, args: &[Arg]) -> Result<String, ConvertError> {
    if args.len() != 2 {
        return Err(arity_err("semverCompare", "2", args.len()));
    }
    let constraint = expr::translate_arg(state, &args[0])?;
    let version = expr::translate_arg(state, &args[1])?;
    state.use_helper("_semverCompare");
    Ok(format!(
        "(_semverCompare & {{#constraint: {}, #version: {}}}).out",
        constraint, version
    ))
}
