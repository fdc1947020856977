//! Control-flow translator (C5, spec.md §4.5) and the YAML-text-to-frame
//! walk that drives it. This is the module that actually walks a
//! [`Block`] of [`Node`]s, writing CUE into the shared [`crate::cue::frame::Emitter`].
//!
//! Nested bodies (`if`/`range`/`with`) are converted into their own
//! temporary buffer and reindented onto the parent — a simpler stand-in for
//! the source's save/restore-frame-stack approach that gets the same
//! result (bodies never leak pending state across a block boundary) without
//! needing the frame stack itself to understand non-YAML nesting.

use crate::cue::expr;
use crate::cue::frame::FrameKind;
use crate::cue::funcs;
use crate::cue::lexer;
use crate::cue::state::{Binding, ConvertState};
use crate::error::ConvertError;
use crate::template_ast::{Arg, Block, IfNode, Node, Pipe, RangeNode, WithNode};

/// Converts a full template body, handling top-level-if extraction
/// (spec.md §4.5 "Top-level if detection"). Returns the positive guard
/// expression (if the template qualifies) and the converted body text.
pub fn convert_template_body(
    state: &mut ConvertState,
    block: &Block,
) -> Result<(Option<String>, String), ConvertError> {
    if let Some(if_node) = top_level_if(block) {
        if if_node.else_block.is_none() {
            let (pos, _neg) = pipe_to_cue_cond(state, &if_node.cond)?;
            let body = convert_subblock(state, &if_node.then_block)?;
            state.emitter.close_all_frames();
            return Ok((Some(pos), body));
        }
    }

    convert_block_body(state, block)?;
    state.emitter.flush_any_pending();
    state.emitter.close_all_frames();
    let text = std::mem::take(&mut state.emitter).into_inner();
    Ok((None, text))
}

/// A template qualifies for top-level-if extraction when its only
/// non-blank, non-comment node is a single `if` with no `else` (spec.md §9
/// Open Question: only whitespace/comments may precede it; this
/// implementation additionally requires nothing non-blank follows it, so
/// the guard can cover the *entire* output as the spec's wording implies).
fn top_level_if(block: &Block) -> Option<&IfNode> {
    let mut found: Option<&IfNode> = None;
    for node in &block.nodes {
        match node {
            Node::Text(t) if t.text.trim().is_empty() => continue,
            Node::Comment(_) => continue,
            Node::If(n) if found.is_none() => found = Some(n),
            _ => return None,
        }
    }
    found
}

fn convert_subblock(state: &mut ConvertState, block: &Block) -> Result<String, ConvertError> {
    let saved = std::mem::take(&mut state.emitter);
    convert_block_body(state, block)?;
    state.emitter.flush_any_pending();
    state.emitter.close_all_frames();
    let text = std::mem::replace(&mut state.emitter, saved).into_inner();
    Ok(text)
}

fn write_reindented(state: &mut ConvertState, text: &str) {
    let indent = lexer::indent_str(state.emitter.depth() + 1);
    for line in text.lines() {
        state.emitter.write(&indent);
        state.emitter.write(line);
        state.emitter.write("\n");
    }
}

pub(crate) fn convert_block_body(state: &mut ConvertState, block: &Block) -> Result<(), ConvertError> {
    for node in &block.nodes {
        convert_node(state, node)?;
    }
    Ok(())
}

fn convert_node(state: &mut ConvertState, node: &Node) -> Result<(), ConvertError> {
    match node {
        Node::Text(t) => process_text(state, &t.text),
        Node::Comment(_) => {}
        Node::Action(a) => handle_action(state, &a.pipe)?,
        Node::If(n) => handle_if(state, n)?,
        Node::Range(n) => handle_range(state, n)?,
        Node::With(n) => handle_with(state, n)?,
        Node::Template(t) => {
            let expr = crate::cue::helpers::resolve_template_call(state, t)?;
            emit_value(state, expr);
        }
    }
    Ok(())
}

/// Walks literal text line by line, tracking YAML block structure
/// (spec.md §4.2). Simplified relative to the full spec: inline
/// interpolation and flow-collection straddling across action boundaries
/// are approximated by treating each line independently, which covers the
/// passthrough/default/helper-call scenarios in spec.md §8 without needing
/// a separate accumulation-mode state machine.
fn process_text(state: &mut ConvertState, text: &str) {
    for raw_line in text.split('\n') {
        if raw_line.trim().is_empty() {
            continue;
        }
        let indent = raw_line.len() - raw_line.trim_start().len();
        let line = raw_line.trim();

        // A deferred key-value from a preceding action resolves against
        // this, the next non-empty line's, indent (spec.md §4.2 "On text
        // input"): deeper promotes it into a block the rest of this line
        // (and further-indented siblings) nest inside; same-or-shallower
        // flushes it as a plain leaf.
        if let Some(kv_indent) = state.emitter.deferred_kv_yaml_indent() {
            if indent > kv_indent {
                state.emitter.promote_deferred_to_block(kv_indent);
            } else {
                state.emitter.flush_deferred_leaf();
            }
        }

        state.emitter.close_frames_above(indent);

        if let Some(pk) = state.emitter.take_pending_key() {
            // A pending bare `key:` whose value never arrived via an action
            // (plain nested YAML): open the block/list frame it introduces.
            if line.starts_with("- ") {
                state
                    .emitter
                    .open_frame(pk.yaml_indent, FrameKind::Sequence, &format!("{}: [", lexer::cue_key(&pk.key)));
            } else {
                state
                    .emitter
                    .open_frame(pk.yaml_indent, FrameKind::Mapping, &format!("{}: {{", lexer::cue_key(&pk.key)));
            }
        }

        if line.starts_with('#') {
            continue;
        }

        if line == "-" || line.starts_with("- ") {
            let rest = line.strip_prefix('-').unwrap_or("").trim_start();
            if state.emitter.in_range_body {
                // List items inside a `range` body emit as bare values
                // (spec.md §4.5): the `- ` marker itself carries no CUE
                // representation, so a marker with nothing after it simply
                // defers to whatever node produces the item's value.
                if !rest.is_empty() {
                    state.emitter.write_line(&lexer::scalar_to_cue(rest));
                }
            } else {
                state.emitter.open_frame(indent, FrameKind::ListItemStruct, "{");
                if !rest.is_empty() {
                    emit_kv_or_bare(state, rest, indent);
                }
            }
            continue;
        }

        emit_kv_or_bare(state, line, indent);
    }
}

fn emit_kv_or_bare(state: &mut ConvertState, line: &str, indent: usize) {
    if let Some(colon) = find_key_colon(line) {
        let key = line[..colon].trim();
        let rest = line[colon + 1..].trim();
        if rest.is_empty() {
            state.emitter.set_pending_key(key.to_string(), indent);
        } else {
            state
                .emitter
                .write_line(&format!("{}: {}", lexer::cue_key(key), lexer::scalar_to_cue(rest)));
        }
    } else {
        state.emitter.write_line(&lexer::scalar_to_cue(line));
    }
}

/// Finds the colon separating a YAML `key:` from its (possibly absent)
/// value, ignoring colons inside quotes.
fn find_key_colon(line: &str) -> Option<usize> {
    let mut in_quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match in_quote {
            Some(q) if c == q => in_quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => in_quote = Some(c),
            None if c == ':' && (i + 1 == line.len() || line[i + 1..].starts_with(' ')) => {
                return Some(i)
            }
            None => {}
        }
    }
    None
}

fn handle_action(state: &mut ConvertState, pipe: &Pipe) -> Result<(), ConvertError> {
    if !pipe.declared_locals.is_empty() {
        return handle_declaration(state, pipe);
    }
    let expr = expr::translate_pipe(state, pipe)?;
    emit_value(state, expr);
    Ok(())
}

/// `$v := expr` / `$a, $b := expr` — records locals, emits nothing
/// (spec.md §3 "Range/with binding", §4.3 "Local variable bindings").
fn handle_declaration(state: &mut ConvertState, pipe: &Pipe) -> Result<(), ConvertError> {
    let without_decl = Pipe {
        declared_locals: Vec::new(),
        commands: pipe.commands.clone(),
    };
    let value = expr::translate_pipe(state, &without_decl)?;
    for name in &pipe.declared_locals {
        state.local_vars.insert(name.clone(), value.clone());
    }
    Ok(())
}

/// Places a value-producing expression where the emitter's state says it
/// belongs: a pending key's value becomes a deferred key-value, left
/// unresolved until `process_text` sees the next non-empty line and
/// decides, by its YAML indent, whether to flush it as a leaf or promote
/// it to a block (spec.md §3 "deferred key-value"); otherwise it's a bare
/// emitted value.
fn emit_value(state: &mut ConvertState, expr: String) {
    if let Some(pk) = state.emitter.take_pending_key() {
        state.emitter.defer_kv(pk.key, expr, pk.yaml_indent);
    } else {
        state.emitter.write_line(&expr);
    }
}

fn handle_if(state: &mut ConvertState, node: &IfNode) -> Result<(), ConvertError> {
    let (pos, neg) = pipe_to_cue_cond(state, &node.cond)?;
    state.emitter.flush_any_pending();

    let then_text = convert_subblock(state, &node.then_block)?;
    state.emitter.write_line(&format!("if {} {{", pos));
    write_reindented(state, &then_text);
    state.emitter.write_line("}");

    if let Some(else_block) = &node.else_block {
        let else_text = convert_subblock(state, else_block)?;
        state.emitter.write_line(&format!("if {} {{", neg));
        write_reindented(state, &else_text);
        state.emitter.write_line("}");
    }
    Ok(())
}

/// `range` → a list comprehension `[ for _, val in expr { body }, ]`
/// (spec.md §4.5 "Range", §8 scenario 4) assigned where the emitter's
/// pending/deferred state says the range's value belongs, the same as any
/// other value-producing node.
fn handle_range(state: &mut ConvertState, node: &RangeNode) -> Result<(), ConvertError> {
    let source = expr::translate_pipe(state, &node.pipe)?;
    if let (Some(object), path) = field_origin(&node.pipe) {
        state.field_tree_mut(&object).record_ref(&path, false, true);
    }

    let val_name = state.next_range_name();
    state.bindings.push(Binding {
        cue_expr: val_name.clone(),
        base_object: None,
        base_path: Vec::new(),
    });

    let prev_in_range = state.emitter.in_range_body;
    state.emitter.in_range_body = true;
    let body_text = convert_subblock(state, &node.body);
    state.emitter.in_range_body = prev_in_range;
    state.bindings.pop();
    let body_text = body_text?;

    let comprehension = render_comprehension(&val_name, &source, &body_text);
    emit_value(state, comprehension);

    if let Some(else_block) = &node.else_block {
        state.needs_nonzero = true;
        let else_text = convert_subblock(state, else_block)?;
        state
            .emitter
            .write_line(&format!("if len({}) == 0 {{", source));
        write_reindented(state, &else_text);
        state.emitter.write_line("}");
    }
    Ok(())
}

/// Renders a `range` body as a CUE list-comprehension literal. A
/// single-line body (the common scalar case) inlines onto one line
/// matching spec.md §8 scenario 4's exact expected text; a multi-line body
/// (struct-valued range targets) keeps its line breaks, indented one level
/// under the comprehension's opening brace.
fn render_comprehension(val_name: &str, source: &str, body_text: &str) -> String {
    let trimmed = body_text.trim_end_matches('\n');
    if !trimmed.contains('\n') {
        return format!("[ for _, {} in {} {{ {} }}, ]", val_name, source, trimmed.trim());
    }
    let mut out = format!("[ for _, {} in {} {{\n", val_name, source);
    for line in trimmed.lines() {
        out.push('\t');
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("}, ]");
    out
}

/// `with` → `if nonzero(expr) { body with dot rebound }`, optional `else`
/// keeping the outer dot (spec.md §9 Open Question, adopted as stated).
fn handle_with(state: &mut ConvertState, node: &WithNode) -> Result<(), ConvertError> {
    let source = expr::translate_pipe(state, &node.pipe)?;
    state.emitter.flush_any_pending();
    state.needs_nonzero = true;

    let (base_object, base_path) = field_origin(&node.pipe);
    state.bindings.push(Binding {
        cue_expr: source.clone(),
        base_object,
        base_path,
    });
    let then_text = convert_subblock(state, &node.body);
    state.bindings.pop();
    let then_text = then_text?;

    state.emitter.write_line(&format!(
        "if (_nonzero & {{#arg: {}, _}}) {{",
        source
    ));
    write_reindented(state, &then_text);
    state.emitter.write_line("}");

    if let Some(else_block) = &node.else_block {
        // Outer dot stays bound for the else branch.
        let else_text = convert_subblock(state, else_block)?;
        state.emitter.write_line(&format!(
            "if !(_nonzero & {{#arg: {}, _}}) {{",
            source
        ));
        write_reindented(state, &else_text);
        state.emitter.write_line("}");
    }
    Ok(())
}

/// If `pipe` is exactly a bare field reference, returns the `(object, path)`
/// it resolves to, so a `range`/`with` binding can propagate nested
/// accesses back into that object's schema.
fn field_origin(pipe: &Pipe) -> (Option<String>, Vec<String>) {
    if pipe.commands.len() == 1 && pipe.commands[0].name.is_none() {
        if let Arg::Field(path) = &pipe.commands[0].args[0] {
            if !path.is_empty() {
                return (Some(path[0].clone()), path[1..].to_vec());
            }
        }
    }
    (None, Vec::new())
}

/// Translates an `if`/`with` condition pipe into `(positive, negative)` CUE
/// guard expressions (spec.md §4.4 "Condition dispatch").
pub fn pipe_to_cue_cond(
    state: &mut ConvertState,
    pipe: &Pipe,
) -> Result<(String, String), ConvertError> {
    if pipe.commands.len() == 1 {
        if let Some(name) = &pipe.commands[0].name {
            let args = &pipe.commands[0].args;
            if let Some(result) = dispatch_condition_name(state, name, args)? {
                return Ok(result);
            }
        }
    }

    let value = expr::translate_pipe(state, pipe)?;
    state.needs_nonzero = true;
    let pos = format!("(_nonzero & {{#arg: {}, _}})", value);
    let neg = format!("!{}", pos);
    Ok((pos, neg))
}

/// Condition dispatch for a single bare argument (used by `ternary`'s
/// condition slot).
pub fn pipe_to_cue_cond_arg(
    state: &mut ConvertState,
    arg: &Arg,
) -> Result<(String, String), ConvertError> {
    pipe_to_cue_cond(state, &Pipe::single(arg.clone()))
}

fn dispatch_condition_name(
    state: &mut ConvertState,
    name: &str,
    args: &[Arg],
) -> Result<Option<(String, String)>, ConvertError> {
    match name {
        "not" => {
            if args.len() != 1 {
                return Err(ConvertError::ArityMismatch {
                    name: "not".to_string(),
                    expected: "1".to_string(),
                    actual: args.len(),
                });
            }
            let (p, n) = pipe_to_cue_cond_arg(state, &args[0])?;
            Ok(Some((n, p)))
        }
        "and" | "or" => {
            if args.len() < 2 {
                return Err(ConvertError::ArityMismatch {
                    name: name.to_string(),
                    expected: "at least 2".to_string(),
                    actual: args.len(),
                });
            }
            let op = if name == "and" { "&&" } else { "||" };
            let mut positives = Vec::new();
            for a in args {
                let (p, _) = pipe_to_cue_cond_arg(state, a)?;
                positives.push(p);
            }
            let pos = format!("({})", positives.join(&format!(" {} ", op)));
            Ok(Some((pos.clone(), format!("!{}", pos))))
        }
        "eq" | "ne" | "lt" | "gt" | "le" | "ge" => {
            if args.len() != 2 {
                return Err(ConvertError::ArityMismatch {
                    name: name.to_string(),
                    expected: "2".to_string(),
                    actual: args.len(),
                });
            }
            let a = expr::translate_arg(state, &args[0])?;
            let b = expr::translate_arg(state, &args[1])?;
            let op = match name {
                "eq" => "==",
                "ne" => "!=",
                "lt" => "<",
                "gt" => ">",
                "le" => "<=",
                _ => ">=",
            };
            let pos = format!("({} {} {})", a, op, b);
            let neg_op = match name {
                "eq" => "!=",
                "ne" => "==",
                "lt" => ">=",
                "gt" => "<=",
                "le" => ">",
                _ => "<",
            };
            let neg = format!("({} {} {})", a, neg_op, b);
            Ok(Some((pos, neg)))
        }
        "empty" => {
            if args.len() != 1 {
                return Err(ConvertError::ArityMismatch {
                    name: "empty".to_string(),
                    expected: "1".to_string(),
                    actual: args.len(),
                });
            }
            let (p, n) = pipe_to_cue_cond_arg(state, &args[0])?;
            Ok(Some((n, p)))
        }
        "hasKey" => {
            if args.len() != 2 {
                return Err(ConvertError::ArityMismatch {
                    name: "hasKey".to_string(),
                    expected: "2".to_string(),
                    actual: args.len(),
                });
            }
            let m = expr::translate_arg(state, &args[0])?;
            let k = expr::translate_arg(state, &args[1])?;
            state.needs_nonzero = true;
            let field = format!("{}.{}", m, k);
            let pos = format!("(_nonzero & {{#arg: {}, _}})", field);
            let neg = format!("!{}", pos);
            Ok(Some((pos, neg)))
        }
        "coalesce" | "include" => Ok(None),
        "semverCompare" => {
            let cue = funcs::semver_compare_cue(state, args)?;
            Ok(Some((format!("({})", cue), format!("!({})", cue))))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::template_ast::{ActionNode, Command, TextNode};

    fn state() -> ConvertState {
        ConvertState::new(ConversionConfig::helm_defaults())
    }

    fn field_pipe(path: &[&str]) -> Pipe {
        Pipe::single(Arg::Field(path.iter().map(|s| s.to_string()).collect()))
    }

    #[test]
    fn plain_text_passthrough() {
        let mut st = state();
        let block = Block::new(vec![Node::Text(TextNode {
            text: "name: test\nport: 80\n".to_string(),
        })]);
        let (guard, body) = convert_template_body(&mut st, &block).unwrap();
        assert!(guard.is_none());
        assert_eq!(body, "name: \"test\"\nport: 80\n");
    }

    #[test]
    fn value_reference_with_default() {
        let mut st = state();
        let pipe = Pipe {
            declared_locals: vec![],
            commands: vec![
                Command {
                    name: None,
                    args: vec![Arg::Field(vec!["Values".into(), "port".into()])],
                },
                Command {
                    name: Some("default".into()),
                    args: vec![Arg::Number("8080".into())],
                },
            ],
        };
        let block = Block::new(vec![
            Node::Text(TextNode {
                text: "port: ".to_string(),
            }),
            Node::Action(ActionNode { pipe }),
        ]);
        let (_, body) = convert_template_body(&mut st, &block).unwrap();
        assert_eq!(body.trim(), "port: #values.port");
        let schema = st.field_trees["Values"].emit("#values");
        assert!(schema.contains("port: *8080"));
    }

    #[test]
    fn conditional_emits_twin_guards() {
        let mut st = state();
        let cond = field_pipe(&["Values", "debug"]);
        let node = IfNode {
            cond,
            then_block: Block::new(vec![Node::Text(TextNode {
                text: "logLevel: debug".to_string(),
            })]),
            else_block: Some(Block::new(vec![Node::Text(TextNode {
                text: "logLevel: info".to_string(),
            })])),
        };
        let block = Block::new(vec![Node::If(node)]);
        let (_, body) = convert_template_body(&mut st, &block).unwrap();
        assert!(body.contains("if (_nonzero & {#arg: #values.debug, _}) {"));
        assert!(body.contains("if !(_nonzero & {#arg: #values.debug, _}) {"));
    }

    #[test]
    fn range_over_list() {
        let mut st = state();
        let node = RangeNode {
            pipe: field_pipe(&["Values", "features"]),
            body: Block::new(vec![Node::Action(ActionNode {
                pipe: Pipe::single(Arg::Field(vec![])),
            })]),
            else_block: None,
        };
        let block = Block::new(vec![
            Node::Text(TextNode {
                text: "features: ".to_string(),
            }),
            Node::Range(node),
        ]);
        let (_, body) = convert_template_body(&mut st, &block).unwrap();
        assert_eq!(
            body.trim(),
            "features: [ for _, _range0 in #values.features { _range0 }, ]"
        );
        let schema = st.field_trees["Values"].emit("#values");
        assert!(schema.contains("features?: _"));
    }

    #[test]
    fn deferred_kv_promotes_to_block_on_deeper_next_line() {
        let mut st = state();
        let block = Block::new(vec![
            Node::Text(TextNode {
                text: "labels: ".to_string(),
            }),
            Node::Action(ActionNode {
                pipe: field_pipe(&["Values", "labels"]),
            }),
            Node::Text(TextNode {
                text: "\n  app: demo\n".to_string(),
            }),
        ]);
        let (_, body) = convert_template_body(&mut st, &block).unwrap();
        assert_eq!(body, "labels: {\n\t#values.labels\n\tapp: \"demo\"\n}\n");
    }

    #[test]
    fn deferred_kv_flushes_as_leaf_on_same_indent_next_line() {
        let mut st = state();
        let block = Block::new(vec![
            Node::Text(TextNode {
                text: "port: ".to_string(),
            }),
            Node::Action(ActionNode {
                pipe: field_pipe(&["Values", "port"]),
            }),
            Node::Text(TextNode {
                text: "\nname: test\n".to_string(),
            }),
        ]);
        let (_, body) = convert_template_body(&mut st, &block).unwrap();
        assert_eq!(body, "port: #values.port\nname: \"test\"\n");
    }

    #[test]
    fn top_level_if_extraction() {
        let mut st = state();
        let cond = field_pipe(&["Values", "enabled"]);
        let node = IfNode {
            cond,
            then_block: Block::new(vec![Node::Text(TextNode {
                text: "name: test".to_string(),
            })]),
            else_block: None,
        };
        let block = Block::new(vec![
            Node::Text(TextNode {
                text: "\n  \n".to_string(),
            }),
            Node::If(node),
        ]);
        let (guard, body) = convert_template_body(&mut st, &block).unwrap();
        assert_eq!(
            guard.as_deref(),
            Some("(_nonzero & {#arg: #values.enabled, _})")
        );
        assert!(body.contains("name: \"test\""));
    }
}
