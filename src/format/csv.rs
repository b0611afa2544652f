//! CSV output formatter

use std::io;

use super::{CsvFormatter, ReportFormatter};
use crate::corpus::FileReport;
use crate::tools::ToolSpec;
use crate::EvalResult;

impl ReportFormatter for CsvFormatter {
    fn format(&self, tools: &[ToolSpec], reports: &[FileReport]) -> EvalResult<String> {
        let mut writer = ::csv::WriterBuilder::new().from_writer(Vec::new());

        let mut header = vec!["file".to_string(), "insns".to_string()];
        for tool in tools {
            for suffix in ["tp", "fp", "fn"] {
                header.push(format!("{}_{}", tool.column, suffix));
            }
        }
        writer.write_record(&header).map_err(io::Error::from)?;

        for report in reports {
            let mut row = vec![report.target.label(), report.mandatory.to_string()];
            for tool in tools {
                // Reports always carry every configured tool, in order.
                match report.tools.iter().find(|t| t.tool == tool.name) {
                    Some(t) => row.extend([t.outcome.tp, t.outcome.fp, t.outcome.fn_].map(|n| n.to_string())),
                    None => row.extend(std::iter::repeat(String::new()).take(3)),
                }
            }
            writer.write_record(&row).map_err(io::Error::from)?;
        }

        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }
}
