//! Disassembler accuracy evaluation against instruction-level ground truth.
//!
//! The crate scores the instruction start addresses reported by a disassembler
//! under test against an authoritative ground-truth set, producing true
//! positive, false positive and false negative counts. Scoring only considers
//! candidates that fall inside known function bodies.
//!
//! # Basic Usage
//!
//! ```rust
//! use disasm_eval::{
//!     matcher::match_instructions,
//!     model::{Candidates, FuncRange, FunctionRanges, GroundTruth, InsnRecord},
//! };
//!
//! let truth = GroundTruth::new(vec![
//!     InsnRecord::mandatory(10),
//!     InsnRecord::optional(20),
//!     InsnRecord::mandatory(30),
//! ]).unwrap();
//! let ranges = FunctionRanges::new(vec![FuncRange::new(0, 100)]).unwrap();
//! let candidates = Candidates::new(vec![10, 25, 30]).unwrap();
//!
//! let outcome = match_instructions(&truth, &candidates, &ranges, 0);
//! assert_eq!((outcome.tp, outcome.fp, outcome.fn_), (2, 1, 0));
//! ```
//!
//! Diagnostic mode walks the same pass lazily and renders each mismatch
//! through an [`diagnostics::InstructionResolver`]; see
//! [`diagnostics::DiagnosticReporter`].

pub mod model;
pub mod matcher;
pub mod diagnostics;
pub mod decoder;
pub mod parser;
pub mod triple;
pub mod source;
pub mod tools;
pub mod corpus;
pub mod format;
pub mod listing;

/// Represents an address in memory
pub type Address = u64;

use std::fmt;
use std::path::PathBuf;

/// Supported architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Architecture {
    /// 32-bit x86
    X86_32,
    /// 64-bit x86
    X86_64,
    /// ARM (32-bit)
    Arm,
    /// AArch64 (ARM 64-bit)
    AArch64,
    /// Unknown architecture
    Unknown,
}

impl Architecture {
    /// Map an ISA name as it appears in a target triple or on the command line.
    pub fn from_isa_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "x86-64" => Architecture::X86_64,
            "i386" | "i486" | "i586" | "i686" | "x86" => Architecture::X86_32,
            "arm" | "armv7" => Architecture::Arm,
            "aarch64" | "arm64" => Architecture::AArch64,
            _ => Architecture::Unknown,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86_32 => write!(f, "x86-32"),
            Architecture::X86_64 => write!(f, "x86-64"),
            Architecture::Arm => write!(f, "ARM"),
            Architecture::AArch64 => write!(f, "AArch64"),
            Architecture::Unknown => write!(f, "Unknown"),
        }
    }
}

/// The input sequence a validation failure was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    /// Ground-truth instruction records
    GroundTruth,
    /// Function body ranges
    FunctionRanges,
    /// Candidate addresses from the tool under test
    Candidates,
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sequence::GroundTruth => write!(f, "ground truth"),
            Sequence::FunctionRanges => write!(f, "function ranges"),
            Sequence::Candidates => write!(f, "candidates"),
        }
    }
}

/// Error type for evaluation operations
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// An input sequence breaks an ordering or uniqueness precondition
    #[error("Invariant violation in {sequence} at index {index}: {detail}")]
    InvariantViolation {
        sequence: Sequence,
        index: usize,
        detail: String,
    },

    /// Ground-truth database could not be read or written
    #[error("Ground truth database error: {0}")]
    GroundTruth(#[from] rusqlite::Error),

    /// A candidate log line is not an address
    #[error("{}:{line}: cannot parse address from {content:?}", .path.display())]
    CandidateParse {
        path: PathBuf,
        line: usize,
        content: String,
    },

    /// Failed to parse binary format
    #[error("Failed to parse binary format: {0}")]
    Parsing(String),

    /// Decoder error
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// Unsupported architecture
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(Architecture),

    /// Target triple outside the supported set
    #[error("Unsupported target triple: {0}")]
    UnsupportedTriple(String),

    /// Tool catalogue could not be loaded
    #[error("Invalid tool configuration: {0}")]
    ToolConfig(#[from] serde_json::Error),

    /// A tool entry is unusable or unknown
    #[error("Tool {name:?}: {reason}")]
    InvalidTool { name: String, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for evaluation operations.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isa_names() {
        assert_eq!(Architecture::from_isa_name("x86_64"), Architecture::X86_64);
        assert_eq!(Architecture::from_isa_name("i686"), Architecture::X86_32);
        assert_eq!(Architecture::from_isa_name("AArch64"), Architecture::AArch64);
        assert_eq!(Architecture::from_isa_name("sparc"), Architecture::Unknown);
    }

    #[test]
    fn test_invariant_violation_message() {
        let err = EvalError::InvariantViolation {
            sequence: Sequence::Candidates,
            index: 3,
            detail: "0x20 follows 0x30".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invariant violation in candidates at index 3: 0x20 follows 0x30"
        );
    }
}
