//! Human-readable rendering of scoring mismatches.
//!
//! The matcher only knows addresses. To show a reviewer what was missed or
//! invented, each [`Mismatch`] is mapped to a file offset in the evaluated
//! binary and decoded by an [`InstructionResolver`]. Any failure on the way
//! degrades the entry to an address-only line; it never aborts a pass.

use std::fmt;

use crate::matcher::{MatchPass, Mismatch};
use crate::parser::AddressSpace;
use crate::Address;

/// A decoded instruction at a requested file offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInsn {
    /// Encoded length in bytes
    pub length: usize,
    /// Mnemonic and operands, e.g. `mov eax, 1`
    pub text: String,
}

/// Why an address could not be rendered as an instruction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionFailure {
    /// No loadable segment maps the virtual address
    #[error("address 0x{0:x} is not backed by file contents")]
    Unmapped(Address),

    /// The file offset lies past the end of the image
    #[error("file offset 0x{offset:x} is outside the image ({len} bytes)")]
    OutOfImage { offset: Address, len: usize },

    /// The bytes at the offset do not start a valid instruction
    #[error("no instruction decodes at file offset 0x{0:x}")]
    Undecodable(Address),

    /// Diagnostics were requested without a binary to decode
    #[error("no instruction resolver available")]
    NoResolver,
}

/// Decodes the instruction starting at a file offset of a binary image.
///
/// Implementations are built per binary and are not shared between threads;
/// parallel callers construct one resolver per task.
pub trait InstructionResolver {
    /// Decode the instruction at `physical` within `image`.
    fn resolve(&self, image: &[u8], physical: Address) -> Result<ResolvedInsn, ResolutionFailure>;
}

/// Everything needed to turn a ground-truth address into instruction text.
#[derive(Clone, Copy)]
pub struct ResolutionContext<'a> {
    pub resolver: &'a dyn InstructionResolver,
    pub space: &'a AddressSpace,
    pub image: &'a [u8],
}

impl ResolutionContext<'_> {
    /// Decode the instruction at virtual address `virt`.
    pub fn resolve(&self, virt: Address) -> Result<ResolvedInsn, ResolutionFailure> {
        let physical = self
            .space
            .virtual_to_physical(virt)
            .ok_or(ResolutionFailure::Unmapped(virt))?;
        if physical as usize >= self.image.len() {
            return Err(ResolutionFailure::OutOfImage {
                offset: physical,
                len: self.image.len(),
            });
        }
        self.resolver.resolve(self.image, physical)
    }
}

/// A mismatch with its instruction text, when it could be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub mismatch: Mismatch,
    pub instruction: Option<String>,
}

impl fmt::Display for DiagnosticEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = self.mismatch.reported_address();
        write!(
            f,
            "{}\t(0x{:x}):{}\t|{}",
            addr,
            addr,
            self.instruction.as_deref().unwrap_or(""),
            self.mismatch.label()
        )
    }
}

/// Renders mismatches, optionally backed by a resolver.
#[derive(Clone, Copy, Default)]
pub struct DiagnosticReporter<'a> {
    context: Option<ResolutionContext<'a>>,
}

impl<'a> DiagnosticReporter<'a> {
    pub fn new(context: ResolutionContext<'a>) -> Self {
        Self {
            context: Some(context),
        }
    }

    /// A reporter that prints addresses only.
    pub fn address_only() -> Self {
        Self { context: None }
    }

    /// Resolve one mismatch. Failures are logged and leave the text empty.
    pub fn render(&self, mismatch: Mismatch) -> DiagnosticEntry {
        let resolved = match &self.context {
            Some(ctx) => ctx.resolve(mismatch.ground_truth_address()),
            None => Err(ResolutionFailure::NoResolver),
        };
        let instruction = match resolved {
            Ok(insn) => Some(insn.text),
            Err(err) => {
                log::debug!("cannot resolve {}: {}", mismatch.label(), err);
                None
            }
        };
        DiagnosticEntry {
            mismatch,
            instruction,
        }
    }

    /// Run `pass` to completion, rendering every mismatch it yields.
    pub fn render_all(&self, pass: &mut MatchPass<'_>) -> Vec<DiagnosticEntry> {
        pass.map(|m| self.render(m)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Candidates, FuncRange, FunctionRanges, GroundTruth, InsnRecord, MatchOutcome};
    use crate::parser::Segment;

    /// Treats every even offset as a one-byte `nop` and odd offsets as garbage.
    struct EvenNops;

    impl InstructionResolver for EvenNops {
        fn resolve(&self, _image: &[u8], physical: Address) -> Result<ResolvedInsn, ResolutionFailure> {
            if physical % 2 == 0 {
                Ok(ResolvedInsn {
                    length: 1,
                    text: format!("nop ; @{physical:x}"),
                })
            } else {
                Err(ResolutionFailure::Undecodable(physical))
            }
        }
    }

    fn space() -> AddressSpace {
        AddressSpace::new(vec![Segment {
            vaddr: 0x1000,
            memsz: 0x100,
            offset: 0x10,
            filesz: 0x100,
        }])
    }

    #[test]
    fn test_render_resolved_instruction() {
        let image = vec![0u8; 0x200];
        let space = space();
        let reporter = DiagnosticReporter::new(ResolutionContext {
            resolver: &EvenNops,
            space: &space,
            image: &image,
        });

        let entry = reporter.render(Mismatch::FalseNegative { offset: 0x1000 });
        assert_eq!(entry.instruction.as_deref(), Some("nop ; @10"));
        assert_eq!(entry.to_string(), "4096\t(0x1000):nop ; @10\t|false negative");
    }

    #[test]
    fn test_render_degrades_on_failure() {
        let image = vec![0u8; 0x40];
        let space = space();
        let reporter = DiagnosticReporter::new(ResolutionContext {
            resolver: &EvenNops,
            space: &space,
            image: &image,
        });

        // Odd offset: the resolver refuses it.
        let odd = reporter.render(Mismatch::FalseNegative { offset: 0x1001 });
        assert_eq!(odd.instruction, None);
        // Mapped, but past the end of the image.
        let short = reporter.render(Mismatch::FalseNegative { offset: 0x1080 });
        assert_eq!(short.instruction, None);
        // Not mapped at all.
        let unmapped = reporter.render(Mismatch::FalsePositive {
            address: 0x9000,
            adjusted: 0x9000,
        });
        assert_eq!(unmapped.to_string(), "36864\t(0x9000):\t|false positive");
    }

    #[test]
    fn test_render_all_keeps_counts() {
        let truth = GroundTruth::new(vec![
            InsnRecord::mandatory(0x1000),
            InsnRecord::mandatory(0x1002),
            InsnRecord::mandatory(0x1008),
        ])
        .unwrap();
        let ranges = FunctionRanges::new(vec![FuncRange::new(0x1000, 0x1010)]).unwrap();
        let candidates = Candidates::new(vec![0x1000, 0x1004, 0x1008]).unwrap();
        let reporter = DiagnosticReporter::address_only();

        let mut pass = MatchPass::new(&truth, &candidates, &ranges, 0);
        let entries = reporter.render_all(&mut pass);
        let outcome = pass.outcome();

        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.instruction.is_none()));
        assert_eq!(
            outcome,
            crate::matcher::match_instructions(&truth, &candidates, &ranges, 0)
        );
        assert_eq!(outcome, MatchOutcome::new(2, 1, 1));
    }
}
