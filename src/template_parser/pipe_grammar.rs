//! `pest`-backed grammar for the pipe/command/argument language inside a
//! template action. Mirrors the way the teacher's `ast_parser` leans on
//! `pest` for its schema grammar while the outer block structure (here:
//! `{{ }}` delimiter scanning and `if`/`range`/`with`/`end` nesting) stays a
//! hand-rolled recursive descent in `mod.rs`, matching the teacher's own
//! `.ptpl` parser split.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

use crate::error::ConvertError;
use crate::template_ast::{Arg, Command, Pipe};

#[derive(PestParser)]
#[grammar = "pipe.pest"]
struct PipeGrammar;

/// Parses the text between `{{` and `}}` (trim markers already stripped,
/// leading keyword such as `if`/`range`/`with` already stripped by the
/// caller) into a [`Pipe`].
pub fn parse_pipe(source: &str) -> Result<Pipe, ConvertError> {
    let mut pairs = PipeGrammar::parse(Rule::main_pipe, source)
        .map_err(|e| ConvertError::InputError(format!("malformed action `{{{{{}}}}}`: {}", source, e)))?;
    let main = pairs.next().expect("main_pipe always produced on success");
    let pipe_pair = main
        .into_inner()
        .find(|p| p.as_rule() == Rule::pipe)
        .expect("main_pipe always contains pipe");
    Ok(build_pipe(pipe_pair))
}

fn build_pipe(pair: Pair<Rule>) -> Pipe {
    let mut declared_locals = Vec::new();
    let mut commands = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::declare => {
                for var in inner.into_inner() {
                    if var.as_rule() == Rule::var_list {
                        for v in var.into_inner() {
                            declared_locals.push(strip_sigil(v.as_str()));
                        }
                    }
                }
            }
            Rule::command => commands.push(build_command(inner)),
            _ => {}
        }
    }

    Pipe {
        declared_locals,
        commands,
    }
}

fn build_command(pair: Pair<Rule>) -> Command {
    let inner = pair.into_inner().next().expect("command has one child");
    match inner.as_rule() {
        Rule::call => {
            let mut parts = inner.into_inner();
            let name = parts.next().expect("call starts with ident").as_str().to_string();
            let args = parts.map(build_arg).collect();
            Command {
                name: Some(name),
                args,
            }
        }
        Rule::bare_value => {
            let arg_pair = inner.into_inner().next().expect("bare_value wraps one arg");
            Command {
                name: None,
                args: vec![build_arg(arg_pair)],
            }
        }
        _ => unreachable!("command only ever contains call or bare_value"),
    }
}

fn build_arg(pair: Pair<Rule>) -> Arg {
    // `arg` is a transparent wrapper rule; unwrap to the concrete production.
    let pair = if pair.as_rule() == Rule::arg {
        pair.into_inner().next().expect("arg wraps one production")
    } else {
        pair
    };

    match pair.as_rule() {
        Rule::field => {
            let path = strip_sigil(pair.as_str());
            let segments = if path.is_empty() {
                Vec::new()
            } else {
                path.split('.').map(str::to_string).collect()
            };
            Arg::Field(segments)
        }
        Rule::variable_path => {
            let raw = pair.as_str();
            let mut segments = raw.split('.');
            let var = strip_sigil(segments.next().expect("variable_path has a $var head"));
            let rest = segments.map(str::to_string).collect();
            Arg::Variable(var, rest)
        }
        Rule::paren_pipe => {
            let inner_pipe = pair
                .into_inner()
                .next()
                .expect("paren_pipe wraps exactly one pipe");
            Arg::Pipe(Box::new(build_pipe(inner_pipe)))
        }
        Rule::string_lit => Arg::String(unescape_string(pair.as_str())),
        Rule::number_lit => Arg::Number(pair.as_str().to_string()),
        Rule::bool_lit => Arg::Bool(pair.as_str() == "true"),
        Rule::nil_lit => Arg::Nil,
        other => unreachable!("unexpected arg production: {:?}", other),
    }
}

/// Strips a leading `.` or `$` sigil, used for both bare `field` text (the
/// leading dot) and `variable`/`var_list` entries (the leading `$`). The
/// `field` rule's text is `.A.b.c` or just `.`; after stripping the sigil an
/// empty string means "bare dot".
fn strip_sigil(s: &str) -> String {
    s.trim_start_matches(['.', '$']).to_string()
}

/// Go-template string literals use Go escape conventions for `"..."`
/// literals; backtick-quoted literals are raw. We only need the common
/// escapes Sprig/Helm templates actually use.
fn unescape_string(raw: &str) -> String {
    if let Some(body) = raw.strip_prefix('`').and_then(|s| s.strip_suffix('`')) {
        return body.to_string();
    }
    let body = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_access() {
        let pipe = parse_pipe(".Values.port").unwrap();
        assert_eq!(pipe.commands.len(), 1);
        assert_eq!(
            pipe.commands[0].args[0],
            Arg::Field(vec!["Values".to_string(), "port".to_string()])
        );
    }

    #[test]
    fn parses_pipeline_with_function() {
        let pipe = parse_pipe(".Values.port | default 8080").unwrap();
        assert_eq!(pipe.commands.len(), 2);
        assert_eq!(pipe.commands[1].name.as_deref(), Some("default"));
        assert_eq!(pipe.commands[1].args[0], Arg::Number("8080".to_string()));
    }

    #[test]
    fn parses_nested_paren_pipe() {
        let pipe = parse_pipe(r#"include "labels" ."#).unwrap();
        assert_eq!(pipe.commands[0].name.as_deref(), Some("include"));
        assert_eq!(pipe.commands[0].args[1], Arg::Field(vec![]));
    }

    #[test]
    fn parses_variable_declaration() {
        let pipe = parse_pipe("$v := .Values.name").unwrap();
        assert_eq!(pipe.declared_locals, vec!["v".to_string()]);
    }

    #[test]
    fn parses_bare_dollar_root_reference() {
        let pipe = parse_pipe("$.Release.Name").unwrap();
        assert_eq!(
            pipe.commands[0].args[0],
            Arg::Variable("".to_string(), vec!["Release".to_string(), "Name".to_string()])
        );
    }

    #[test]
    fn parses_named_variable_path() {
        let pipe = parse_pipe("$v.suffix").unwrap();
        assert_eq!(
            pipe.commands[0].args[0],
            Arg::Variable("v".to_string(), vec!["suffix".to_string()])
        );
    }

    #[test]
    fn parses_quoted_string_with_escape() {
        let pipe = parse_pipe(r#"printf "a\"b""#).unwrap();
        assert_eq!(pipe.commands[0].args[1], Arg::String("a\"b".to_string()));
    }
}
