//! Command-line front end (SPEC_FULL.md "CLI").
//!
//! Mirrors the teacher's `PipelineConfig`/`CompilationPipeline` split: a
//! small `clap`-derived argument struct feeding a handful of free functions
//! that do the actual chart discovery and file writing, keeping `main.rs`
//! itself a thin dispatcher.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::ConversionConfig;
use crate::cue::chart::{self, ChartResult};
use crate::cue_check::StructuralCheck;
use crate::template_ast::Block;
use crate::template_parser;

/// Translates Helm/Sprig-flavored Go templates into CUE.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert every template in a Helm chart directory.
    Chart {
        /// Path to the chart's root directory (containing `Chart.yaml`).
        chart_dir: PathBuf,
        /// Directory to write the converted CUE files into.
        out_dir: PathBuf,
        /// Optional TOML configuration file (defaults to Helm's builtin
        /// context objects and core functions).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Convert a single standalone template file, optionally against a set
    /// of `_helpers.tpl`-style helper files.
    Template {
        /// Template file to convert.
        file: PathBuf,
        /// Additional files containing only `{{ define ... }}` blocks.
        #[arg(short = 'H', long = "helpers")]
        helpers: Vec<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the version and exit.
    Version,
}

/// Runs the parsed CLI invocation; returns the process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Version => {
            println!("helm2cue {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Command::Template {
            file,
            helpers,
            config,
        } => run_template(&file, &helpers, config.as_deref()),
        Command::Chart {
            chart_dir,
            out_dir,
            config,
        } => run_chart(&chart_dir, &out_dir, config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<ConversionConfig> {
    match path {
        Some(p) => ConversionConfig::load(p)
            .with_context(|| format!("loading config from {}", p.display())),
        None => Ok(ConversionConfig::helm_defaults()),
    }
}

fn run_template(file: &Path, helper_files: &[PathBuf], config: Option<&Path>) -> Result<i32> {
    let cfg = load_config(config)?;

    let mut helper_sources = HashMap::new();
    for helper_file in helper_files {
        let text = fs::read_to_string(helper_file)
            .with_context(|| format!("reading {}", helper_file.display()))?;
        let parsed = template_parser::parse(&text)
            .with_context(|| format!("parsing {}", helper_file.display()))?;
        for (name, body) in parsed.defines {
            helper_sources.insert(name, body);
        }
    }

    let text =
        fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let parsed =
        template_parser::parse(&text).with_context(|| format!("parsing {}", file.display()))?;
    for (name, body) in &parsed.defines {
        helper_sources.insert(name.clone(), body.clone());
    }

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());
    let templates = vec![(name, parsed.body)];

    let chart = chart::convert_chart(&cfg, helper_sources, templates, &StructuralCheck);
    emit_chart_debug(&chart);
    report_warnings(&chart);

    let files = chart::render_files(&cfg, &chart);
    for (name, body) in &files {
        println!("// --- {} ---", name);
        print!("{}", body);
    }

    Ok(if chart.templates.is_empty() { 1 } else { 0 })
}

fn run_chart(chart_dir: &Path, out_dir: &Path, config: Option<&Path>) -> Result<i32> {
    let cfg = load_config(config)?;

    let chart_yaml = chart_dir.join("Chart.yaml");
    if !chart_yaml.exists() {
        anyhow::bail!(
            "{} does not look like a chart directory (no Chart.yaml)",
            chart_dir.display()
        );
    }

    let (helper_sources, templates) = discover_chart(chart_dir)?;
    if templates.is_empty() {
        tracing::warn!(chart = %chart_dir.display(), "no templates found under templates/");
    }

    let chart = chart::convert_chart(&cfg, helper_sources, templates, &StructuralCheck);
    emit_chart_debug(&chart);
    report_warnings(&chart);

    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    let files = chart::render_files(&cfg, &chart);
    for (name, body) in &files {
        let path = out_dir.join(name);
        fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    }

    tracing::info!(
        templates = chart.templates.len(),
        warnings = chart.warnings.len(),
        files = files.len(),
        "chart conversion complete"
    );

    Ok(if chart.warnings.is_empty() { 0 } else { 1 })
}

/// Walks a chart directory for `templates/**/*.yaml` (and the same under
/// `charts/*/templates` for subcharts), parsing each into a body block and
/// folding `define`s from every file (including `_helpers.tpl`-named ones)
/// into one shared helper-source map. `NOTES.txt` is skipped, matching
/// Helm's own convention of excluding it from rendered manifest output.
pub fn discover_chart(
    chart_dir: &Path,
) -> Result<(HashMap<String, Block>, Vec<(String, Block)>)> {
    let mut helper_sources = HashMap::new();
    let mut templates = Vec::new();

    for entry in walkdir::WalkDir::new(chart_dir)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let in_templates_dir = path
            .ancestors()
            .any(|a| a.file_name().map(|n| n == "templates").unwrap_or(false));
        if !in_templates_dir {
            continue;
        }
        let file_name = path.file_name().unwrap_or_default().to_string_lossy();
        if file_name == "NOTES.txt" {
            continue;
        }
        let ext_ok = path
            .extension()
            .map(|e| e == "yaml" || e == "yml" || e == "tpl")
            .unwrap_or(false);
        if !ext_ok {
            continue;
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let parsed = template_parser::parse(&text)
            .with_context(|| format!("parsing {}", path.display()))?;

        for (name, body) in parsed.defines {
            helper_sources.insert(name, body);
        }

        if file_name.starts_with('_') {
            // Helper-only file (e.g. `_helpers.tpl`): defines already
            // collected above, no standalone template body to render.
            continue;
        }

        let rel = path
            .strip_prefix(chart_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();
        templates.push((rel, parsed.body));
    }

    Ok((helper_sources, templates))
}

fn emit_chart_debug(chart: &ChartResult) {
    if std::env::var_os("HELM2CUE_DEBUG").is_none() {
        return;
    }
    for t in &chart.templates {
        tracing::debug!(template = %t.name, body = %t.body, "converted template body");
    }
}

fn report_warnings(chart: &ChartResult) {
    for warning in &chart.warnings {
        tracing::warn!("{}", warning);
    }
}
