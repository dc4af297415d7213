//! Output formatting for analysis results

use crate::analysis::Analysis;
use facet::Facet;
use owo_colors::OwoColorize;
use tfcov_core::findings::{Finding, Severity};
use tfcov_core::{EntityCoverage, TestFunction};

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// What the text renderer includes beyond the summary
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// List every entity with its linked tests
    pub verbose: bool,
    pub show_unmatched: bool,
    /// Show how each test was linked and with what confidence
    pub show_confidence: bool,
}

pub fn render(analysis: &Analysis, format: OutputFormat, options: RenderOptions) -> String {
    match format {
        OutputFormat::Text => render_text(analysis, options),
        OutputFormat::Json => render_json(analysis),
    }
}

fn render_text(analysis: &Analysis, options: RenderOptions) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str(&format!(
        "{} {} Test Coverage\n",
        "##".bold(),
        analysis.root.display().to_string().cyan().bold()
    ));
    output.push('\n');

    let percent = analysis.tested_percent();
    let percent_str = format!("{:.1}%", percent);
    let color_percent = if percent >= 80.0 {
        percent_str.green().to_string()
    } else if percent >= 50.0 {
        percent_str.yellow().to_string()
    } else {
        percent_str.red().to_string()
    };
    output.push_str(&format!(
        "Tested: {} ({}/{} entities)\n",
        color_percent,
        analysis.tested_count(),
        analysis.entity_count()
    ));
    let stats = &analysis.stats;
    output.push_str(&format!(
        "  {}\n",
        format!(
            "{} resources, {} data sources, {} actions; {}/{} test functions linked",
            stats.resources,
            stats.data_sources,
            stats.actions,
            stats.linked_test_functions,
            stats.test_functions
        )
        .dimmed()
    ));

    if !analysis.warnings.is_empty() {
        output.push_str(&format!(
            "\n{} {} files could not be read:\n",
            "!".yellow().bold(),
            analysis.warnings.len()
        ));
        for warning in &analysis.warnings {
            output.push_str(&format!("  {} {}\n", "-".yellow(), warning.dimmed()));
        }
    }

    if options.verbose {
        output.push_str(&format!("\n{} Entities:\n", "#".bold()));
        for entry in &analysis.coverage.entries {
            let key = entry.entity.key();
            let marker = if entry.coverage.has_basic_test {
                "+".green().bold().to_string()
            } else {
                "-".red().bold().to_string()
            };
            output.push_str(&format!(
                "  {} {} {} {}\n",
                marker,
                key.kind.as_str().dimmed(),
                entry.entity.name.cyan(),
                coverage_tags(&entry.coverage).dimmed()
            ));
            for test in analysis.tests.get(&key).into_iter().flatten() {
                output.push_str(&format!("      {}\n", test_line(test, options.show_confidence)));
            }
        }
    }

    if !analysis.findings.is_empty() {
        output.push_str(&format!(
            "\n{} {} findings:\n",
            "!".red().bold(),
            analysis.findings.len()
        ));
        for finding in &analysis.findings {
            render_finding(&mut output, finding);
        }
    }

    if options.show_unmatched && !analysis.unmatched.is_empty() {
        output.push_str(&format!(
            "\n{} {} test functions not linked to any entity:\n",
            "?".yellow().bold(),
            analysis.unmatched.len()
        ));
        for test in &analysis.unmatched {
            output.push_str(&format!(
                "  {} {} {}\n",
                "-".yellow(),
                test.name,
                format!("({}, {})", test.location, test.category).dimmed()
            ));
        }
    }

    output
}

fn render_finding(output: &mut String, finding: &Finding) {
    let severity = match finding.severity {
        Severity::Error => finding.severity.as_str().red().bold().to_string(),
        Severity::Warning => finding.severity.as_str().yellow().bold().to_string(),
        Severity::Info => finding.severity.as_str().blue().to_string(),
    };
    output.push_str(&format!(
        "  {} [{}] {}\n",
        severity,
        finding.analyzer.as_str().dimmed(),
        finding.message
    ));
    if !finding.location.file.is_empty() {
        output.push_str(&format!("      at {}\n", finding.location.to_string().dimmed()));
    }
    for suggestion in &finding.suggestions {
        output.push_str(&format!("      {} {}\n", "->".blue(), suggestion));
    }
}

fn coverage_tags(coverage: &EntityCoverage) -> String {
    if !coverage.has_basic_test {
        return "(no tests)".to_string();
    }
    let tags = [
        (coverage.has_update_test, "update"),
        (coverage.has_import_test, "import"),
        (coverage.has_error_test, "error"),
        (coverage.has_state_check || coverage.has_plan_check, "checks"),
        (coverage.has_check_destroy, "destroy"),
    ];
    let present: Vec<&str> = tags.iter().filter(|(on, _)| *on).map(|(_, t)| *t).collect();
    format!(
        "({} tests, {} steps; {})",
        coverage.test_count,
        coverage.step_count,
        if present.is_empty() { "basic only".to_string() } else { present.join(", ") }
    )
}

fn test_line(test: &TestFunction, show_confidence: bool) -> String {
    if show_confidence {
        format!(
            "{} {}",
            test.name,
            format!("[{} {:.2}]", test.match_type.as_str(), test.match_confidence).dimmed()
        )
    } else {
        test.name.clone()
    }
}

#[derive(Facet)]
struct JsonReport {
    root: String,
    tested_percent: f64,
    resources: usize,
    data_sources: usize,
    actions: usize,
    test_functions: usize,
    linked_test_functions: usize,
    entities: Vec<JsonEntity>,
    findings: Vec<JsonFinding>,
    unmatched_tests: Vec<JsonTest>,
    warnings: Vec<String>,
}

#[derive(Facet)]
struct JsonEntity {
    kind: String,
    name: String,
    file: String,
    line: usize,
    import_capable: bool,
    coverage: EntityCoverage,
    tests: Vec<JsonTest>,
}

#[derive(Facet)]
struct JsonTest {
    name: String,
    file: String,
    line: usize,
    category: String,
    match_type: String,
    match_confidence: f64,
}

#[derive(Facet)]
struct JsonFinding {
    analyzer: String,
    severity: String,
    entity: Option<String>,
    file: String,
    line: usize,
    message: String,
    suggestions: Vec<String>,
}

fn json_test(test: &TestFunction) -> JsonTest {
    JsonTest {
        name: test.name.clone(),
        file: test.location.file.clone(),
        line: test.location.line,
        category: test.category.as_str().to_string(),
        match_type: test.match_type.as_str().to_string(),
        match_confidence: test.match_confidence,
    }
}

fn render_json(analysis: &Analysis) -> String {
    let stats = &analysis.stats;
    let report = JsonReport {
        root: analysis.root.display().to_string(),
        tested_percent: analysis.tested_percent(),
        resources: stats.resources,
        data_sources: stats.data_sources,
        actions: stats.actions,
        test_functions: stats.test_functions,
        linked_test_functions: stats.linked_test_functions,
        entities: analysis
            .coverage
            .entries
            .iter()
            .map(|entry| {
                let key = entry.entity.key();
                JsonEntity {
                    kind: key.kind.as_str().to_string(),
                    name: entry.entity.name.clone(),
                    file: entry.entity.location.file.clone(),
                    line: entry.entity.location.line,
                    import_capable: entry.entity.import_capable,
                    coverage: entry.coverage.clone(),
                    tests: analysis
                        .tests
                        .get(&key)
                        .into_iter()
                        .flatten()
                        .map(|t| json_test(t))
                        .collect(),
                }
            })
            .collect(),
        findings: analysis
            .findings
            .iter()
            .map(|f| JsonFinding {
                analyzer: f.analyzer.as_str().to_string(),
                severity: f.severity.as_str().to_string(),
                entity: f.entity.as_ref().map(ToString::to_string),
                file: f.location.file.clone(),
                line: f.location.line,
                message: f.message.clone(),
                suggestions: f.suggestions.clone(),
            })
            .collect(),
        unmatched_tests: analysis.unmatched.iter().map(|t| json_test(t)).collect(),
        warnings: analysis.warnings.clone(),
    };

    facet_json::to_string_pretty(&report).unwrap_or_default()
}
