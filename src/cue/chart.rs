//! Multi-template merger (C8, spec.md §4.8).
//!
//! Converts each template in a chart independently, then converges field
//! references, defaults, and helper usage across all of them into one CUE
//! module: a schema file, a context file, a helpers file, one file per
//! successfully converted template, and a results list.

use std::collections::{BTreeSet, HashMap};

use crate::config::ConversionConfig;
use crate::cue::helpers;
use crate::cue_check::CueCheck;
use crate::cue::schema::FieldTree;
use crate::cue::state::ConvertState;
use crate::cue::{control, funcs};
use crate::error::{ConvertError, TemplateError};
use crate::template_ast::Block;

/// The result of converting one template (spec.md §3 "Per-template result").
#[derive(Debug, Clone)]
pub struct TemplateResult {
    pub name: String,
    /// Sanitized CUE field name this template's body is assigned to.
    pub field_name: String,
    pub guard: Option<String>,
    pub body: String,
    pub field_trees: HashMap<String, FieldTree>,
    pub imports: BTreeSet<String>,
    pub used_helpers: BTreeSet<String>,
    pub needs_nonzero: bool,
    pub has_dynamic_include: bool,
}

/// Converts a single template against a chart's shared helper sources.
pub fn convert_template(
    config: &ConversionConfig,
    helper_sources: &HashMap<String, Block>,
    name: &str,
    block: &Block,
) -> Result<TemplateResult, ConvertError> {
    let mut state = ConvertState::new(config.clone());
    state.helper_sources = helper_sources.clone();

    let (guard, body) = control::convert_template_body(&mut state, block)?;

    Ok(TemplateResult {
        name: name.to_string(),
        field_name: template_field_name(name),
        guard,
        body,
        field_trees: state.field_trees,
        imports: state.imports,
        used_helpers: state.used_helpers,
        needs_nonzero: state.needs_nonzero,
        has_dynamic_include: state.has_dynamic_include,
    })
}

/// Derives a hidden CUE field name from a template's file name, using the
/// same sanitization rule as helper names (spec.md §4.6 step 1) under a
/// `_tmpl_` prefix so template fields and helper fields never collide.
fn template_field_name(name: &str) -> String {
    let stem = name
        .rsplit('/')
        .next()
        .unwrap_or(name)
        .split('.')
        .next()
        .unwrap_or(name);
    let mut out = String::from("_tmpl_");
    for c in stem.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if c.is_ascii_uppercase() {
            out.push(c.to_ascii_lowercase());
        } else {
            out.push('_');
        }
    }
    out
}

/// The converged chart-level state (spec.md §4.8), ready for emission.
#[derive(Debug)]
pub struct ChartResult {
    pub templates: Vec<TemplateResult>,
    pub warnings: Vec<TemplateError>,
    pub merged_field_trees: HashMap<String, FieldTree>,
    pub helper_defs_text: String,
    pub helpers_map_text: Option<String>,
    pub needs_nonzero: bool,
    pub has_dynamic_include: bool,
    pub used_core_helpers: BTreeSet<String>,
    pub imports: BTreeSet<String>,
}

/// Converts every template in `templates` (sorted into filename order per
/// spec.md §5 ordering guarantee (b)) and folds the results together.
/// Per-template failures are collected as warnings rather than aborting the
/// whole chart (spec.md §7 "Propagation policy").
pub fn convert_chart(
    config: &ConversionConfig,
    helper_sources: HashMap<String, Block>,
    mut templates: Vec<(String, Block)>,
    checker: &dyn CueCheck,
) -> ChartResult {
    templates.sort_by(|a, b| a.0.cmp(&b.0));

    let mut results = Vec::new();
    let mut warnings = Vec::new();
    for (name, block) in &templates {
        match convert_template(config, &helper_sources, name, block) {
            Ok(r) => match crate::cue::validate::validate_template(checker, &r.body, r.guard.as_deref())
            {
                Ok(()) => results.push(r),
                Err(reason) => {
                    tracing::warn!(template = %name, %reason, "template body failed validation");
                    warnings.push(TemplateError {
                        template: name.clone(),
                        error: ConvertError::InvalidOutput(reason),
                    })
                }
            },
            Err(error) => {
                tracing::warn!(template = %name, %error, "template conversion failed");
                warnings.push(TemplateError {
                    template: name.clone(),
                    error,
                })
            }
        }
    }

    let mut merged: HashMap<String, FieldTree> = HashMap::new();
    let mut imports = BTreeSet::new();
    let mut used_core_helpers = BTreeSet::new();
    let mut needs_nonzero = false;
    let mut has_dynamic_include = false;
    for r in &results {
        for (obj, tree) in &r.field_trees {
            merged.entry(obj.clone()).or_default().merge(tree);
        }
        imports.extend(r.imports.iter().cloned());
        used_core_helpers.extend(r.used_helpers.iter().cloned());
        needs_nonzero |= r.needs_nonzero;
        has_dynamic_include |= r.has_dynamic_include;
    }

    // Compile the full helper catalog once, independently of any one
    // template's conversion, so the helpers file always carries every
    // registered `define` in deterministic order (spec.md §5 (a)).
    let mut helper_state = ConvertState::new(config.clone());
    helper_state.helper_sources = helper_sources;
    if let Err(error) = helpers::compile_all_helpers(&mut helper_state) {
        tracing::warn!(%error, "helper compilation failed");
    }
    helpers::collapse_invalid(&mut helper_state, checker);
    let helper_defs_text = helpers::render_helper_defs(&helper_state);
    let helpers_map_text = if has_dynamic_include {
        Some(helpers::render_helpers_map(&helper_state))
    } else {
        None
    };
    needs_nonzero |= helper_state.needs_nonzero;
    used_core_helpers.extend(helper_state.used_helpers.iter().cloned());
    imports.extend(helper_state.imports.iter().cloned());

    if results.is_empty() {
        tracing::error!("every template in the chart failed to convert");
    }

    ChartResult {
        templates: results,
        warnings,
        merged_field_trees: merged,
        helper_defs_text,
        helpers_map_text,
        needs_nonzero,
        has_dynamic_include,
        used_core_helpers,
        imports,
    }
}

/// Assembles the final set of named CUE files/units for a converted chart
/// (spec.md §4.8 "Emitted output layout").
pub fn render_files(config: &ConversionConfig, chart: &ChartResult) -> Vec<(String, String)> {
    let mut files = Vec::new();

    // Schema file: `#values` built from the merged Values field tree (if the
    // caller configured a "Values" context object).
    if let Some(values_name) = config.context_def("Values") {
        let empty = FieldTree::new();
        let tree = chart.merged_field_trees.get("Values").unwrap_or(&empty);
        files.push(("values.cue".to_string(), tree.emit(values_name)));
    }

    // Context file: every other configured context object.
    let mut context_text = String::new();
    let mut object_names: Vec<&String> = config.context_objects.keys().collect();
    object_names.sort();
    for object in object_names {
        if object == "Values" {
            continue;
        }
        let def_name = config.context_def(object).unwrap();
        let empty = FieldTree::new();
        let tree = chart.merged_field_trees.get(object).unwrap_or(&empty);
        context_text.push_str(&tree.emit(def_name));
    }
    if !context_text.is_empty() {
        files.push(("context.cue".to_string(), context_text));
    }

    // Helpers file: `_nonzero`, any builtin helper bodies actually used,
    // compiled `define`-based helpers, and the dynamic-include map.
    let mut helpers_text = String::new();
    if chart.needs_nonzero {
        helpers_text.push_str(funcs::NONZERO_HELPER);
    }
    for name in &chart.used_core_helpers {
        if name == "_nonzero" {
            continue;
        }
        if let Some(src) = funcs::builtin_helper_source(name) {
            helpers_text.push_str(src);
        }
    }
    helpers_text.push_str(&chart.helper_defs_text);
    if let Some(map) = &chart.helpers_map_text {
        helpers_text.push_str(map);
    }
    if !helpers_text.is_empty() {
        files.push(("helpers.cue".to_string(), helpers_text));
    }

    // One file per successfully converted template.
    let mut results_list = String::from("results: [\n");
    for t in &chart.templates {
        let mut text = format!("{}: {{\n{}}}\n", t.field_name, indent(&t.body));
        if let Some(guard) = &t.guard {
            text = format!("if {} {{\n{}}}\n", guard, indent(&text));
        }
        files.push((format!("{}.cue", t.field_name), text));
        results_list.push_str(&format!("\t{},\n", t.field_name));
    }
    results_list.push_str("]\n");
    files.push(("results.cue".to_string(), results_list));

    files
}

fn indent(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        out.push('\t');
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template_ast::{Arg, Node, Pipe, TextNode};

    fn config() -> ConversionConfig {
        ConversionConfig::helm_defaults()
    }

    fn port_template() -> Block {
        Block::new(vec![
            Node::Text(TextNode {
                text: "port: ".to_string(),
            }),
            Node::Action(crate::template_ast::ActionNode {
                pipe: Pipe {
                    declared_locals: vec![],
                    commands: vec![
                        crate::template_ast::Command {
                            name: None,
                            args: vec![Arg::Field(vec!["Values".into(), "port".into()])],
                        },
                        crate::template_ast::Command {
                            name: Some("default".into()),
                            args: vec![Arg::Number("8080".into())],
                        },
                    ],
                },
            }),
        ])
    }

    #[test]
    fn converts_single_template_and_records_schema() {
        let cfg = config();
        let result = convert_template(&cfg, &HashMap::new(), "deployment.yaml", &port_template())
            .unwrap();
        assert_eq!(result.field_name, "_tmpl_deployment");
        assert!(result.body.contains("port: #values.port"));
        assert!(result.field_trees["Values"].emit("#values").contains("*8080"));
    }

    #[test]
    fn chart_merges_across_templates_and_renders_files() {
        let cfg = config();
        let templates = vec![
            ("b.yaml".to_string(), port_template()),
            ("a.yaml".to_string(), port_template()),
        ];
        let chart = convert_chart(&cfg, HashMap::new(), templates, &crate::cue_check::StructuralCheck);
        assert_eq!(chart.templates.len(), 2);
        // sorted filename order: a.yaml before b.yaml
        assert_eq!(chart.templates[0].name, "a.yaml");
        assert_eq!(chart.templates[1].name, "b.yaml");

        let files = render_files(&cfg, &chart);
        let names: Vec<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"values.cue"));
        assert!(names.contains(&"results.cue"));
        assert!(names.contains(&"_tmpl_a.cue"));
        assert!(names.contains(&"_tmpl_b.cue"));
    }

    #[test]
    fn failed_template_surfaces_as_warning_not_abort() {
        let cfg = config();
        let bad = Block::new(vec![Node::Action(crate::template_ast::ActionNode {
            pipe: Pipe::single(Arg::Field(vec!["Nope".into(), "x".into()])),
        })]);
        let chart = convert_chart(
            &cfg,
            HashMap::new(),
            vec![("bad.yaml".to_string(), bad)],
            &crate::cue_check::StructuralCheck,
        );
        assert!(chart.templates.is_empty());
        assert_eq!(chart.warnings.len(), 1);
        assert_eq!(chart.warnings[0].template, "bad.yaml");
    }
}
