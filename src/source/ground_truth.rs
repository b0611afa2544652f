//! SQLite-backed ground truth.
//!
//! One database per binary. `instructions` holds every instruction start with
//! its optional flag; `functions` holds the half-open function bodies.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags};

use crate::model::{FuncRange, FunctionRanges, GroundTruth, InsnRecord};
use crate::{Address, EvalResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS instructions (
    offset   INTEGER PRIMARY KEY,
    optional INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS functions (
    start_offset INTEGER NOT NULL,
    end_offset   INTEGER NOT NULL
);
"#;

/// Ground truth for a single binary.
#[derive(Debug)]
pub struct GroundTruthDb {
    conn: Connection,
}

impl GroundTruthDb {
    /// Open an existing database without write access.
    pub fn open(path: &Path) -> EvalResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Open (or create) a database and make sure both tables exist.
    pub fn create(path: &Path) -> EvalResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn insert_instruction(&self, record: InsnRecord) -> EvalResult<()> {
        self.conn.execute(
            "INSERT INTO instructions (offset, optional) VALUES (?1, ?2)",
            params![to_sql_int(record.offset), record.optional],
        )?;
        Ok(())
    }

    pub fn insert_function(&self, range: FuncRange) -> EvalResult<()> {
        self.conn.execute(
            "INSERT INTO functions (start_offset, end_offset) VALUES (?1, ?2)",
            params![to_sql_int(range.start), to_sql_int(range.end)],
        )?;
        Ok(())
    }

    /// All instruction records in offset order.
    pub fn instructions(&self) -> EvalResult<GroundTruth> {
        let mut stmt = self
            .conn
            .prepare("SELECT offset, optional FROM instructions ORDER BY offset")?;
        let rows = stmt.query_map([], |row| {
            Ok(InsnRecord::new(address_column(row, 0)?, row.get(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        GroundTruth::new(out)
    }

    /// All function bodies in start order, with exact duplicates removed.
    pub fn functions(&self) -> EvalResult<FunctionRanges> {
        let mut stmt = self.conn.prepare(
            "SELECT start_offset, end_offset FROM functions ORDER BY start_offset, end_offset",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(FuncRange::new(address_column(row, 0)?, address_column(row, 1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        FunctionRanges::from_unsorted(out)
    }

    /// Instructions and function bodies together.
    pub fn load(&self) -> EvalResult<(GroundTruth, FunctionRanges)> {
        Ok((self.instructions()?, self.functions()?))
    }
}

// SQLite integers are signed; an address past i64::MAX reads back as out of range.
fn to_sql_int(addr: Address) -> i64 {
    addr as i64
}

fn address_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Address> {
    let value: i64 = row.get(idx)?;
    Address::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}
