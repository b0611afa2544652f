//! JSON Lines output formatter

use serde::Serialize;

use super::{JsonLinesFormatter, ReportFormatter};
use crate::corpus::FileReport;
use crate::model::MatchOutcome;
use crate::tools::ToolSpec;
use crate::EvalResult;

/// Serializable per-tool scores
#[derive(Serialize)]
struct ToolJson<'a> {
    tool: &'a str,
    column: &'a str,
    #[serde(flatten)]
    outcome: MatchOutcome,
}

/// Serializable per-binary report, one line each
#[derive(Serialize)]
struct FileJson<'a> {
    file: String,
    insns: usize,
    tools: Vec<ToolJson<'a>>,
}

impl ReportFormatter for JsonLinesFormatter {
    fn format(&self, tools: &[ToolSpec], reports: &[FileReport]) -> EvalResult<String> {
        let mut output = String::new();
        for report in reports {
            let line = FileJson {
                file: report.target.label(),
                insns: report.mandatory,
                tools: tools
                    .iter()
                    .filter_map(|spec| report.tools.iter().find(|t| t.tool == spec.name))
                    .map(|t| ToolJson {
                        tool: &t.tool,
                        column: &t.column,
                        outcome: t.outcome,
                    })
                    .collect(),
            };
            output.push_str(&serde_json::to_string(&line).map_err(std::io::Error::from)?);
            output.push('\n');
        }
        Ok(output)
    }
}
