//! CUE lexical emitter (C1, spec.md §4.1).
//!
//! Low-level text production: scalar formatting, identifier quoting,
//! interpolation escaping, and indentation. Nothing here understands YAML
//! block structure (that's [`crate::cue::frame`]) or the template AST
//! (that's [`crate::cue::expr`]).

use once_cell::sync::Lazy;
use regex::Regex;

static BARE_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

/// Converts a parsed YAML scalar or flow collection into its CUE textual
/// form. Falls back to a quoted rendering of the source bytes on any parse
/// failure (spec.md §4.1 "Error").
pub fn scalar_to_cue(yaml_text: &str) -> String {
    let trimmed = yaml_text.trim();
    match trimmed {
        "true" => return "true".to_string(),
        "false" => return "false".to_string(),
        "null" | "~" => return "null".to_string(),
        _ => {}
    }

    if is_cue_number(trimmed) {
        return trimmed.to_string();
    }

    if (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
    {
        if let Ok(value) = serde_yaml::from_str::<serde_yaml::Value>(trimmed) {
            return yaml_value_to_cue(&value);
        }
        return quote_string(trimmed);
    }

    if let Ok(serde_yaml::Value::String(s)) = serde_yaml::from_str::<serde_yaml::Value>(trimmed) {
        return quote_string(&s);
    }

    quote_string(trimmed)
}

fn is_cue_number(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_digit() || c == '.')
        && s.chars().next().map_or(false, |c| c.is_ascii_digit())
        && s.matches('.').count() <= 1
}

fn yaml_value_to_cue(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => "null".to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => quote_string(s),
        serde_yaml::Value::Sequence(items) => {
            let body: Vec<String> = items.iter().map(yaml_value_to_cue).collect();
            format!("[{}]", body.join(", "))
        }
        serde_yaml::Value::Mapping(map) => {
            let body: Vec<String> = map
                .iter()
                .map(|(k, v)| {
                    let key = k.as_str().unwrap_or_default();
                    format!("{}: {}", cue_key(key), yaml_value_to_cue(v))
                })
                .collect();
            format!("{{{}}}", body.join(", "))
        }
        serde_yaml::Value::Tagged(t) => yaml_value_to_cue(&t.value),
    }
}

/// Escapes a literal fragment for placement inside a `"\(...)"` interpolated
/// CUE string.
pub fn escape_for_interpolation(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Quotes a raw string as a canonical CUE double-quoted literal.
pub fn quote_string(s: &str) -> String {
    format!("\"{}\"", escape_for_interpolation(s))
}

/// Returns `s` verbatim if it is a valid bare CUE identifier, else its
/// quoted form.
pub fn cue_key(s: &str) -> String {
    if BARE_IDENT.is_match(s) {
        s.to_string()
    } else {
        quote_string(s)
    }
}

/// A single tab per indent level; CUE is whitespace-insensitive so this is
/// purely cosmetic, never load-bearing for semantics (spec.md §4.1).
pub fn indent_str(level: usize) -> String {
    "\t".repeat(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_booleans_and_null() {
        assert_eq!(scalar_to_cue("true"), "true");
        assert_eq!(scalar_to_cue("false"), "false");
        assert_eq!(scalar_to_cue("null"), "null");
        assert_eq!(scalar_to_cue("~"), "null");
    }

    #[test]
    fn scalar_numbers_pass_through() {
        assert_eq!(scalar_to_cue("80"), "80");
        assert_eq!(scalar_to_cue("3.14"), "3.14");
        assert_eq!(scalar_to_cue("-5"), "-5");
    }

    #[test]
    fn bare_strings_get_quoted() {
        assert_eq!(scalar_to_cue("test"), "\"test\"");
    }

    #[test]
    fn quoted_yaml_strings_are_requoted() {
        assert_eq!(scalar_to_cue("'hello'"), "\"hello\"");
        assert_eq!(scalar_to_cue("\"hello\""), "\"hello\"");
    }

    #[test]
    fn flow_sequence_reemits_as_cue_list() {
        assert_eq!(scalar_to_cue("[1, 2, 3]"), "[1, 2, 3]");
    }

    #[test]
    fn flow_mapping_reemits_as_cue_struct() {
        assert_eq!(scalar_to_cue("{a: 1, b: two}"), "{a: 1, b: \"two\"}");
    }

    #[test]
    fn malformed_flow_collection_falls_back_to_quoted_source() {
        let out = scalar_to_cue("[1, 2,");
        assert_eq!(out, "\"[1, 2,\"");
    }

    #[test]
    fn cue_key_quotes_non_identifiers() {
        assert_eq!(cue_key("plain_name"), "plain_name");
        assert_eq!(cue_key("with-dash"), "\"with-dash\"");
    }
}
