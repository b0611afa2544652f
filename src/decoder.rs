//! Capstone-backed instruction resolution for diagnostic output.

use std::fmt;

use capstone::arch::arm::ArchMode as ArmMode;
use capstone::arch::arm64::ArchMode as Arm64Mode;
use capstone::arch::x86::ArchMode as X86Mode;
use capstone::prelude::BuildsCapstone;
use capstone::Capstone;

use crate::diagnostics::{InstructionResolver, ResolutionFailure, ResolvedInsn};
use crate::{Address, Architecture, EvalError, EvalResult};

/// Longest encoding any supported ISA can produce.
pub const MAX_INSTRUCTION_SIZE: usize = 16;

/// A Capstone handle configured for one ISA.
pub struct CapstoneDecoder {
    arch: Architecture,
    cs: Capstone,
}

impl CapstoneDecoder {
    /// Create a decoder for a specific architecture
    pub fn for_architecture(arch: Architecture) -> EvalResult<Self> {
        let built = match arch {
            Architecture::X86_32 => Capstone::new().x86().mode(X86Mode::Mode32).detail(false).build(),
            Architecture::X86_64 => Capstone::new().x86().mode(X86Mode::Mode64).detail(false).build(),
            Architecture::Arm => Capstone::new().arm().mode(ArmMode::Arm).detail(false).build(),
            Architecture::AArch64 => Capstone::new().arm64().mode(Arm64Mode::Arm).detail(false).build(),
            Architecture::Unknown => return Err(EvalError::UnsupportedArchitecture(arch)),
        };
        let cs = built.map_err(|e| EvalError::Decoder(format!("Capstone error: {e}")))?;
        Ok(Self { arch, cs })
    }

    /// Get the architecture of this decoder
    pub fn architecture(&self) -> Architecture {
        self.arch
    }
}

impl fmt::Debug for CapstoneDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapstoneDecoder").field("arch", &self.arch).finish()
    }
}

impl fmt::Display for CapstoneDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapstoneDecoder::{}", self.arch)
    }
}

impl InstructionResolver for CapstoneDecoder {
    fn resolve(&self, image: &[u8], physical: Address) -> Result<ResolvedInsn, ResolutionFailure> {
        let offset = physical as usize;
        if offset >= image.len() {
            return Err(ResolutionFailure::OutOfImage {
                offset: physical,
                len: image.len(),
            });
        }

        // Only look at a small slice
        let end = std::cmp::min(offset + MAX_INSTRUCTION_SIZE, image.len());
        let insns = self
            .cs
            .disasm_count(&image[offset..end], physical, 1)
            .map_err(|_| ResolutionFailure::Undecodable(physical))?;
        let insn = insns
            .iter()
            .next()
            .ok_or(ResolutionFailure::Undecodable(physical))?;

        let length = insn.bytes().len();
        if length == 0 {
            return Err(ResolutionFailure::Undecodable(physical));
        }

        let mnemonic = insn.mnemonic().unwrap_or("");
        let text = match insn.op_str() {
            Some(ops) if !ops.is_empty() => format!("{mnemonic} {ops}"),
            _ => mnemonic.to_string(),
        };
        Ok(ResolvedInsn { length, text })
    }
}
