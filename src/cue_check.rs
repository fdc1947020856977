//! The CUE parser/formatter seam (spec.md §1 "Out of scope": "the final CUE
//! formatter/validator invoked on emitted text").
//!
//! This crate does not vendor a CUE implementation. [`CueCheck`] is the
//! trait a real one would be plugged in behind; [`StructuralCheck`] is a
//! conservative, dependency-free stand-in used when no such implementation
//! is wired in, following the same "thin external collaborator" shape the
//! teacher uses for its own out-of-scope boundaries (e.g. `rhai`'s `Engine`
//! as a black box behind `rhai_generator`).

/// Whether a fragment of CUE source text parses (and, for the final
/// assembly, formats) successfully.
pub trait CueCheck {
    /// Parse-checks a standalone CUE source fragment, returning an error
    /// description on failure.
    fn parse_check(&self, source: &str) -> Result<(), String>;

    /// Runs the canonical formatter over `source`; returns the formatted
    /// text, or an error description on failure (spec.md §4.9 "Final
    /// output").
    fn format(&self, source: &str) -> Result<String, String> {
        self.parse_check(source)?;
        Ok(source.to_string())
    }
}

/// A conservative structural stand-in for a real CUE parser: checks that
/// braces, brackets, and quotes balance. Cannot catch semantic errors, but
/// never false-rejects well-formed output, which is what this crate's own
/// test suite (spec.md §8) relies on.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralCheck;

impl CueCheck for StructuralCheck {
    fn parse_check(&self, source: &str) -> Result<(), String> {
        let mut braces = 0i32;
        let mut brackets = 0i32;
        let mut in_string: Option<char> = None;
        let mut escaped = false;

        for c in source.chars() {
            if let Some(q) = in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    in_string = None;
                }
                continue;
            }
            match c {
                '"' | '\'' => in_string = Some(c),
                '{' => braces += 1,
                '}' => braces -= 1,
                '[' => brackets += 1,
                ']' => brackets -= 1,
                _ => {}
            }
            if braces < 0 || brackets < 0 {
                return Err(format!("unbalanced closer near: {}", source));
            }
        }

        if in_string.is_some() {
            return Err("unterminated string literal".to_string());
        }
        if braces != 0 {
            return Err(format!("unbalanced braces ({braces} unclosed)"));
        }
        if brackets != 0 {
            return Err(format!("unbalanced brackets ({brackets} unclosed)"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_source_passes() {
        let check = StructuralCheck;
        assert!(check.parse_check("#values: {\n\tport: int\n}\n").is_ok());
    }

    #[test]
    fn unbalanced_braces_fail() {
        let check = StructuralCheck;
        assert!(check.parse_check("#values: {\n\tport: int\n").is_err());
    }

    #[test]
    fn quoted_braces_are_ignored() {
        let check = StructuralCheck;
        assert!(check.parse_check(r#"name: "{ not a brace }""#).is_ok());
    }

    #[test]
    fn format_defaults_to_parse_check_then_passthrough() {
        let check = StructuralCheck;
        assert_eq!(check.format("a: 1\n").unwrap(), "a: 1\n");
        assert!(check.format("a: {\n").is_err());
    }
}
