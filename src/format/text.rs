//! Plain text listing of mismatches

use std::fmt::Write;

use super::DiagnosticFormatter;
use crate::corpus::FileReport;

impl DiagnosticFormatter {
    /// Render one block per binary: a `<dir>/<file>, <insns>` line, each
    /// tool's mismatches, then an end marker.
    pub fn format(&self, reports: &[FileReport]) -> String {
        let mut output = String::new();
        for report in reports {
            // Writing to a String cannot fail.
            let _ = writeln!(output, "{}, {}", report.target.label(), report.mandatory);
            for tool in &report.tools {
                let _ = writeln!(output, "++++++++++{} errors++++++++++", tool.tool);
                for entry in &tool.diagnostics {
                    let _ = writeln!(output, "{entry}");
                }
            }
            let _ = writeln!(output, "----------{} end----------", report.target.file);
        }
        output
    }
}
