//! Output validation seam (C9, spec.md §4.9).
//!
//! Two checks run against the [`CueCheck`] collaborator: each template body
//! is wrapped and parse-checked on its own before it is allowed into a
//! chart's results (a template that doesn't even balance brackets is dropped
//! as a warning rather than shipped broken), and the fully assembled output
//! is run through the formatter as a last gate before being written out.

use crate::cue_check::CueCheck;

/// Wraps a converted template body (and its optional top-level `if` guard)
/// in a throwaway struct and parse-checks it in isolation, so one broken
/// template can be dropped without touching the rest of the chart.
pub fn validate_template(
    checker: &dyn CueCheck,
    body: &str,
    guard: Option<&str>,
) -> Result<(), String> {
    let wrapped = match guard {
        Some(g) => format!("_body: {{\n\tif {g} {{\n{}\t}}\n}}\n", indent(body, 2)),
        None => format!("_body: {{\n{}}}\n", indent(body, 1)),
    };
    checker.parse_check(&wrapped)
}

/// Runs the canonical formatter over a fully assembled output file. A
/// formatter error here is fatal (spec.md §4.9 "Final output"): unlike a
/// single template, there's no smaller unit to fall back to.
pub fn validate_output(checker: &dyn CueCheck, source: &str) -> Result<String, String> {
    checker.format(source)
}

fn indent(text: &str, levels: usize) -> String {
    let prefix = "\t".repeat(levels);
    let mut out = String::new();
    for line in text.lines() {
        out.push_str(&prefix);
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cue_check::StructuralCheck;

    #[test]
    fn balanced_body_without_guard_passes() {
        let checker = StructuralCheck;
        assert!(validate_template(&checker, "port: #values.port\n", None).is_ok());
    }

    #[test]
    fn balanced_body_with_guard_passes() {
        let checker = StructuralCheck;
        assert!(validate_template(&checker, "port: #values.port\n", Some("#values.enabled")).is_ok());
    }

    #[test]
    fn unbalanced_body_fails() {
        let checker = StructuralCheck;
        assert!(validate_template(&checker, "port: {\n", None).is_err());
    }

    #[test]
    fn final_output_runs_through_formatter() {
        let checker = StructuralCheck;
        assert_eq!(
            validate_output(&checker, "a: 1\n").unwrap(),
            "a: 1\n"
        );
        assert!(validate_output(&checker, "a: {\n").is_err());
    }
}
