//! Instruction addresses reported by a disassembler under test.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::model::Candidates;
use crate::{Address, EvalError, EvalResult};

/// On-disk layout of a tool's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateFormat {
    /// One address per line, decimal or `0x` hex. `#` starts a comment.
    Text,
    /// An `instructions` table with an integer `offset` column.
    Sqlite,
}

/// Read and sort the addresses in `path`.
pub fn read_candidates(path: &Path, format: CandidateFormat) -> EvalResult<Candidates> {
    let addrs = match format {
        CandidateFormat::Text => parse_text(path, BufReader::new(File::open(path)?))?,
        CandidateFormat::Sqlite => read_sqlite(path)?,
    };
    log::debug!("read {} candidate addresses from {}", addrs.len(), path.display());
    Ok(Candidates::from_unsorted(addrs))
}

/// Parse a text listing. Only the first field of each line is used, so
/// `0x401000 push rbp` and `4198400,5` both yield one address.
pub fn parse_text(path: &Path, reader: impl BufRead) -> EvalResult<Vec<Address>> {
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let content = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line.as_str(),
        };
        let Some(field) = content
            .split(|c: char| c.is_whitespace() || c == ',')
            .find(|f| !f.is_empty())
        else {
            continue;
        };
        let addr = parse_address(field).ok_or_else(|| EvalError::CandidateParse {
            path: path.to_path_buf(),
            line: idx + 1,
            content: line.clone(),
        })?;
        out.push(addr);
    }
    Ok(out)
}

/// Parse a decimal or `0x`-prefixed hexadecimal address.
pub fn parse_address(field: &str) -> Option<Address> {
    let field = field.trim();
    match field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
        Some(hex) => Address::from_str_radix(hex, 16).ok(),
        None => field.parse().ok(),
    }
}

fn read_sqlite(path: &Path) -> EvalResult<Vec<Address>> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut stmt = conn.prepare("SELECT offset FROM instructions")?;
    let rows = stmt.query_map([], |row| {
        let value: i64 = row.get(0)?;
        Address::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(0, value))
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_parse_address_forms() {
        assert_eq!(parse_address("4198400"), Some(0x401000));
        assert_eq!(parse_address("0x401000"), Some(0x401000));
        assert_eq!(parse_address("0X1f"), Some(0x1f));
        assert_eq!(parse_address("0xzz"), None);
        assert_eq!(parse_address("-4"), None);
    }

    #[test]
    fn test_parse_text_listing() {
        let listing = "# bap output\n0x20 push rbp\n\n16\n0x18,4  # trailing\n   \n0x20\n";
        let addrs = parse_text(Path::new("tool.out"), Cursor::new(listing)).unwrap();
        assert_eq!(addrs, vec![0x20, 16, 0x18, 0x20]);
    }

    #[test]
    fn test_parse_text_reports_bad_line() {
        let err = parse_text(Path::new("tool.out"), Cursor::new("0x10\nnot-an-address\n")).unwrap_err();
        match err {
            EvalError::CandidateParse { line, content, .. } => {
                assert_eq!(line, 2);
                assert_eq!(content, "not-an-address");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_read_candidates_sorts_and_keeps_duplicates() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("hello_r2.out");
        std::fs::write(&path, "0x30\n0x10\n0x30\n0x20\n").unwrap();

        let cands = read_candidates(&path, CandidateFormat::Text).unwrap();
        assert_eq!(cands.addrs(), &[0x10, 0x20, 0x30, 0x30]);
    }

    #[test]
    fn test_read_sqlite_candidates() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("hello.sqlite3");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE instructions (offset INTEGER);
                 INSERT INTO instructions VALUES (48), (16), (32);",
            )
            .unwrap();
        }

        let cands = read_candidates(&path, CandidateFormat::Sqlite).unwrap();
        assert_eq!(cands.addrs(), &[16, 32, 48]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().expect("tempdir");
        let err = read_candidates(&dir.path().join("none.out"), CandidateFormat::Text).unwrap_err();
        assert!(matches!(err, EvalError::Io(_)));
    }
}
