//! Output formatting for CLI commands.

use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

use brats_verify::{Outcome, Precondition, Scenario, ScenarioReport, SuiteReport};

const REPORT_SCHEMA_VERSION: &str = "brats.report.v1";

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Print data in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => println!("{}", format_json(data, "[]")),
    }
}

/// Print a single item in the specified format.
pub fn print_single<T: Serialize>(data: &T) {
    println!("{}", format_json(data, "{}"));
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

#[derive(Debug, Tabled)]
pub struct ReportRow {
    #[tabled(rename = "SCENARIO")]
    pub scenario: String,
    #[tabled(rename = "STATUS")]
    pub status: String,
    #[tabled(rename = "APP")]
    pub app: String,
    #[tabled(rename = "DURATION")]
    pub duration: String,
    #[tabled(rename = "DETAIL")]
    pub detail: String,
}

impl From<&ScenarioReport> for ReportRow {
    fn from(report: &ScenarioReport) -> Self {
        let detail = match &report.outcome {
            Outcome::Passed => String::new(),
            Outcome::Skipped { reason } => reason.clone(),
            Outcome::Failed { message, .. } => truncate(message, 100),
        };
        Self {
            scenario: report.name.clone(),
            status: report.outcome.label().to_string(),
            app: report.app_name.clone().unwrap_or_else(|| "-".to_string()),
            duration: format!("{:.1}s", report.duration_ms as f64 / 1000.0),
            detail,
        }
    }
}

/// Print a suite report.
pub fn print_report(report: &SuiteReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_single(report),
        OutputFormat::Table => {
            let rows: Vec<ReportRow> = report.scenarios.iter().map(ReportRow::from).collect();
            if rows.is_empty() {
                println!("{}", "No scenarios selected.".dimmed());
                return;
            }
            println!("{}", Table::new(&rows));

            for scenario in &report.scenarios {
                for warning in &scenario.cleanup_warnings {
                    println!("{} {}: {}", "Warning:".yellow().bold(), scenario.name, warning);
                }
            }

            let summary = format!(
                "{} passed, {} failed, {} skipped",
                report.passed(),
                report.failed(),
                report.skipped()
            );
            if report.is_success() {
                println!("{}", summary.green().bold());
            } else {
                println!("{}", summary.red().bold());
            }
        }
    }
}

/// A catalog entry as shown by `brats list`.
#[derive(Debug, Serialize, Tabled)]
pub struct ScenarioRow {
    #[tabled(rename = "NAME")]
    pub name: String,
    #[tabled(rename = "FIXTURE")]
    pub fixture: String,
    #[tabled(rename = "BUILDPACKS")]
    pub buildpacks: String,
    #[tabled(rename = "REQUIRES")]
    pub requires: String,
    #[tabled(rename = "DESCRIPTION")]
    pub description: String,
}

impl From<&Scenario> for ScenarioRow {
    fn from(scenario: &Scenario) -> Self {
        let requires: Vec<String> = scenario
            .preconditions
            .iter()
            .map(Precondition::to_string)
            .collect();
        Self {
            name: scenario.name.clone(),
            fixture: scenario.fixture.display().to_string(),
            buildpacks: if scenario.buildpacks.is_empty() {
                "(detect)".to_string()
            } else {
                scenario.buildpacks.join(", ")
            },
            requires: requires.join(", "),
            description: scenario.description.clone().unwrap_or_default(),
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= max {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max).collect();
        format!("{}...", cut)
    }
}

fn format_json<T: Serialize + ?Sized>(data: &T, fallback: &str) -> String {
    let value = serde_json::to_value(data).unwrap_or_else(|_| serde_json::json!({}));
    let sorted = sort_json_value(wrap_with_schema(value));
    serde_json::to_string_pretty(&sorted).unwrap_or_else(|_| fallback.to_string())
}

fn wrap_with_schema(value: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "schemaVersion": REPORT_SCHEMA_VERSION,
        "data": value
    })
}

fn sort_json_value(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Array(values) => {
            serde_json::Value::Array(values.into_iter().map(sort_json_value).collect())
        }
        serde_json::Value::Object(entries) => {
            let mut pairs: Vec<_> = entries.into_iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            let mut mapped = serde_json::Map::new();
            for (key, value) in pairs {
                mapped.insert(key, sort_json_value(value));
            }
            serde_json::Value::Object(mapped)
        }
        other => other,
    }
}
