use std::fs;

use helm2cue::cli::discover_chart;
use helm2cue::config::ConversionConfig;
use helm2cue::cue::chart;
use helm2cue::cue_check::StructuralCheck;

fn write(dir: &std::path::Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn discovers_templates_and_helpers_skipping_notes() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Chart.yaml", "name: demo\n");
    write(
        dir.path(),
        "templates/deployment.yaml",
        "replicas: {{ .Values.replicas | default 1 }}\n",
    );
    write(
        dir.path(),
        "templates/_helpers.tpl",
        "{{ define \"demo.name\" }}{{ .Release.Name }}{{ end }}\n",
    );
    write(dir.path(), "templates/NOTES.txt", "thanks for installing\n");

    let (helpers, templates) = discover_chart(dir.path()).unwrap();
    assert_eq!(helpers.len(), 1);
    assert!(helpers.contains_key("demo.name"));
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].0, "templates/deployment.yaml");
}

#[test]
fn end_to_end_chart_conversion_produces_schema_and_template_files() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Chart.yaml", "name: demo\n");
    write(
        dir.path(),
        "templates/deployment.yaml",
        "replicas: {{ .Values.replicas | default 1 }}\nname: {{ include \"demo.fullname\" . }}\n",
    );
    write(
        dir.path(),
        "templates/_helpers.tpl",
        "{{ define \"demo.fullname\" }}{{ .Release.Name }}-demo{{ end }}\n",
    );

    let (helper_sources, templates) = discover_chart(dir.path()).unwrap();
    let cfg = ConversionConfig::helm_defaults();
    let result = chart::convert_chart(&cfg, helper_sources, templates, &StructuralCheck);

    assert!(result.warnings.is_empty(), "unexpected warnings: {:?}", result.warnings);
    assert_eq!(result.templates.len(), 1);

    let files = chart::render_files(&cfg, &result);
    let values = files
        .iter()
        .find(|(n, _)| n == "values.cue")
        .map(|(_, b)| b.clone())
        .unwrap();
    assert!(values.contains("replicas?"));
    assert!(values.contains("*1"));

    let helpers_file = files
        .iter()
        .find(|(n, _)| n == "helpers.cue")
        .map(|(_, b)| b.clone())
        .unwrap();
    assert!(helpers_file.contains("fullname"));

    let results_file = files
        .iter()
        .find(|(n, _)| n == "results.cue")
        .map(|(_, b)| b.clone())
        .unwrap();
    assert!(results_file.contains("_tmpl_deployment"));
}
