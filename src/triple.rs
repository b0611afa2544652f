//! Target triples naming the binaries under evaluation.
//!
//! Triples use five dash-separated fields, `arch-vendor-os-env-obj`, e.g.
//! `x86_64-PC-Linux-GNU-ELF`. The object field must agree with what the
//! parser finds in each binary.

use std::fmt;
use std::str::FromStr;

use crate::parser::ObjectFormat;
use crate::{Architecture, EvalError};

/// Triples the evaluator accepts.
pub const SUPPORTED_TRIPLES: &[&str] = &[
    "x86_64-PC-Linux-GNU-ELF",
    "i386-PC-Linux-GNU-ELF",
    "x86_64-PC-Win32-MSVC-COFF",
    "i386-PC-Win32-MSVC-COFF",
];

/// A validated target triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub arch: String,
    pub vendor: String,
    pub os: String,
    pub env: String,
    pub obj: String,
}

impl Triple {
    /// ISA used to decode instructions for this target.
    pub fn architecture(&self) -> Architecture {
        Architecture::from_isa_name(&self.arch)
    }

    /// Object format implied by the `os-env-obj` tail.
    pub fn object_format(&self) -> ObjectFormat {
        match self.obj.as_str() {
            "COFF" => ObjectFormat::Coff,
            _ => ObjectFormat::Elf,
        }
    }
}

impl FromStr for Triple {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !SUPPORTED_TRIPLES.contains(&s) {
            return Err(EvalError::UnsupportedTriple(s.to_string()));
        }
        let fields: Vec<&str> = s.split('-').collect();
        match fields.as_slice() {
            [arch, vendor, os, env, obj] => Ok(Triple {
                arch: arch.to_string(),
                vendor: vendor.to_string(),
                os: os.to_string(),
                env: env.to_string(),
                obj: obj.to_string(),
            }),
            _ => Err(EvalError::UnsupportedTriple(s.to_string())),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}",
            self.arch, self.vendor, self.os, self.env, self.obj
        )
    }
}
