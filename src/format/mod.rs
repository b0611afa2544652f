//! Report formatters

mod csv;
mod json;
mod text;

use crate::corpus::FileReport;
use crate::tools::ToolSpec;
use crate::EvalResult;
use clap::ValueEnum;
use std::fmt;
use std::str::FromStr;

/// Supported report formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One comma-separated row per binary (default)
    #[default]
    Csv,
    /// One JSON object per binary
    #[value(name = "jsonl")]
    JsonLines,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Csv => write!(f, "csv"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "jsonl" | "jsonlines" => Ok(OutputFormat::JsonLines),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl OutputFormat {
    /// Get a formatter for this output format
    pub fn get_formatter(&self) -> Box<dyn ReportFormatter> {
        match self {
            OutputFormat::Csv => Box::new(CsvFormatter),
            OutputFormat::JsonLines => Box::new(JsonLinesFormatter),
        }
    }
}

/// Formatter trait for evaluation reports
pub trait ReportFormatter {
    /// Format the reports of one run. `tools` fixes the column order.
    fn format(&self, tools: &[ToolSpec], reports: &[FileReport]) -> EvalResult<String>;
}

/// Format reports as CSV
pub struct CsvFormatter;

/// Format reports as JSON Lines
pub struct JsonLinesFormatter;

/// Format the per-mismatch listing of diagnostic mode
pub struct DiagnosticFormatter;
