//! Instruction listing of one binary at a given set of addresses.
//!
//! The addresses come from a ground-truth database or from a tool's output.
//! Each one inside the file-backed part of the image is decoded and printed;
//! function starts, when the source has them, open a new labelled block.

use std::fmt::{self, Write};
use std::path::Path;

use clap::ValueEnum;

use crate::diagnostics::{InstructionResolver, ResolutionContext};
use crate::parser::BinaryImage;
use crate::source::{read_candidates, CandidateFormat, GroundTruthDb};
use crate::{Address, EvalResult};

/// Kind of file the listed addresses are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListSource {
    /// Ground-truth database, with function starts
    #[value(name = "gt")]
    GroundTruth,
    /// SQLite output of a tool under test
    Sqlite,
    /// Address-per-line output of a tool under test
    Text,
}

/// Addresses to list, sorted and unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingInput {
    pub instructions: Vec<Address>,
    pub functions: Vec<Address>,
}

/// Read the instruction and function start addresses in `path`.
pub fn read_listing_input(path: &Path, source: ListSource) -> EvalResult<ListingInput> {
    let (mut instructions, mut functions) = match source {
        ListSource::GroundTruth => {
            let db = GroundTruthDb::open(path)?;
            let (truth, ranges) = db.load()?;
            (
                truth.records().iter().map(|r| r.offset).collect::<Vec<_>>(),
                ranges.ranges().iter().map(|r| r.start).collect::<Vec<_>>(),
            )
        }
        ListSource::Sqlite => (read_candidates(path, CandidateFormat::Sqlite)?.addrs().to_vec(), Vec::new()),
        ListSource::Text => (read_candidates(path, CandidateFormat::Text)?.addrs().to_vec(), Vec::new()),
    };
    instructions.sort_unstable();
    instructions.dedup();
    functions.sort_unstable();
    functions.dedup();
    Ok(ListingInput {
        instructions,
        functions,
    })
}

/// One listed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLine {
    pub address: Address,
    pub function_start: bool,
    /// Encoded bytes, empty when nothing decodes here
    pub bytes: Vec<u8>,
    pub text: Option<String>,
}

impl fmt::Display for ListingLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.text {
            Some(text) => {
                let bytes = self
                    .bytes
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(" ");
                write!(f, "  0x{:08x}: {:<30} ; {}", self.address, text, bytes)
            }
            None => write!(f, "  0x{:08x}: (bad)", self.address),
        }
    }
}

/// Decode every input address that lies in the file-backed part of `image`.
pub fn build_listing(
    input: &ListingInput,
    image: &BinaryImage,
    resolver: &dyn InstructionResolver,
) -> Vec<ListingLine> {
    let Some((low, high)) = image.space.file_bounds() else {
        log::warn!("image has no file-backed segments; nothing to list");
        return Vec::new();
    };
    let ctx = ResolutionContext {
        resolver,
        space: &image.space,
        image: &image.data,
    };

    let lines: Vec<ListingLine> = input
        .instructions
        .iter()
        .copied()
        .filter(|addr| (low..high).contains(addr))
        .map(|address| {
            let function_start = input.functions.binary_search(&address).is_ok();
            match ctx.resolve(address) {
                Ok(insn) => {
                    let bytes = image
                        .space
                        .virtual_to_physical(address)
                        .and_then(|p| image.data.get(p as usize..p as usize + insn.length))
                        .map(<[u8]>::to_vec)
                        .unwrap_or_default();
                    ListingLine {
                        address,
                        function_start,
                        bytes,
                        text: Some(insn.text),
                    }
                }
                Err(e) => {
                    log::debug!("0x{:x}: {}", address, e);
                    ListingLine {
                        address,
                        function_start,
                        bytes: Vec::new(),
                        text: None,
                    }
                }
            }
        })
        .collect();

    let skipped = input.instructions.len() - lines.len();
    if skipped > 0 {
        log::info!("{} addresses outside 0x{:x}..0x{:x} not listed", skipped, low, high);
    }
    lines
}

/// Render a listing, opening a `<0x...>:` block at every function start.
pub fn format_listing(lines: &[ListingLine]) -> String {
    let mut output = String::new();
    for line in lines {
        // Writing to a String cannot fail.
        if line.function_start {
            let _ = writeln!(output, "\n<0x{:x}>:", line.address);
        }
        let _ = writeln!(output, "{line}");
    }
    output
}
