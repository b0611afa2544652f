//! The disassemblers under test and where their output lives.
//!
//! Each tool writes one output file per binary under
//! `<corpus>/<tool dir>/<dir>/`, named by substituting the binary's file name
//! into the tool's pattern.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::source::CandidateFormat;
use crate::{EvalError, EvalResult};

/// Placeholder replaced by the binary's file name.
pub const FILE_PLACEHOLDER: &str = "{file}";

/// One disassembler under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Name used on the command line and in diagnostic headers
    pub name: String,
    /// Prefix of the tool's report columns (`<column>_tp`, ...)
    pub column: String,
    /// Directory under the corpus root holding this tool's output
    pub dir: String,
    /// Output file name, with `{file}` standing for the binary's name
    pub file_pattern: String,
    pub format: CandidateFormat,
    /// Subtracted from every reported address before scoring
    #[serde(default)]
    pub address_offset: i64,
}

impl ToolSpec {
    fn new(name: &str, column: &str, dir: &str, file_pattern: &str, format: CandidateFormat) -> Self {
        Self {
            name: name.to_string(),
            column: column.to_string(),
            dir: dir.to_string(),
            file_pattern: file_pattern.to_string(),
            format,
            address_offset: 0,
        }
    }

    /// Output file name for `file`.
    pub fn output_name(&self, file: &str) -> String {
        self.file_pattern.replace(FILE_PLACEHOLDER, file)
    }

    fn validate(&self) -> EvalResult<()> {
        let invalid = |reason: &str| EvalError::InvalidTool {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.is_empty() || self.column.is_empty() || self.dir.is_empty() {
            return Err(invalid("name, column and dir must be non-empty"));
        }
        if !self.file_pattern.contains(FILE_PLACEHOLDER) {
            return Err(invalid("file_pattern must contain {file}"));
        }
        Ok(())
    }
}

/// The tools evaluated when no configuration is given, in report order.
pub fn default_tools() -> Vec<ToolSpec> {
    use CandidateFormat::{Sqlite, Text};
    vec![
        ToolSpec::new("ls", "ls", "ls", "{file}.sqlite3", Sqlite),
        ToolSpec::new("bap", "bap", "bap", "{file}_bap.out", Text),
        ToolSpec::new("ghidra", "ghi", "ghidra", "{file}_ghidra.out", Text),
        ToolSpec::new("radare2", "r2", "radare2", "{file}_r2.out", Text),
        ToolSpec::new("rose", "rse", "rose", "{file}_rose.out", Text),
        ToolSpec::new("ddisasm", "ddm", "ddisasm", "{file}_ddisasm.out", Text),
    ]
}

/// Load a JSON array of tool entries.
pub fn load_tools(path: &Path) -> EvalResult<Vec<ToolSpec>> {
    let text = fs::read_to_string(path)?;
    parse_tools(&text)
}

/// Parse and validate a JSON array of tool entries.
pub fn parse_tools(json: &str) -> EvalResult<Vec<ToolSpec>> {
    let tools: Vec<ToolSpec> = serde_json::from_str(json)?;
    let mut seen = HashSet::new();
    for tool in &tools {
        tool.validate()?;
        if !seen.insert(tool.name.as_str()) {
            return Err(EvalError::InvalidTool {
                name: tool.name.clone(),
                reason: "listed more than once".to_string(),
            });
        }
    }
    Ok(tools)
}

/// Keep only the named tools, in the order given.
pub fn select_tools(tools: &[ToolSpec], names: &[String]) -> EvalResult<Vec<ToolSpec>> {
    names
        .iter()
        .map(|name| {
            tools
                .iter()
                .find(|t| &t.name == name)
                .cloned()
                .ok_or_else(|| EvalError::InvalidTool {
                    name: name.clone(),
                    reason: "not a configured tool".to_string(),
                })
        })
        .collect()
}
