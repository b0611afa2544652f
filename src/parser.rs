//! Goblin-based object parsing and virtual/file offset translation.

use std::fmt;
use std::fs;
use std::path::Path;

use goblin::{elf, pe, Object};

use crate::{Address, Architecture, EvalError, EvalResult};

/// Object file formats the evaluator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFormat {
    Elf,
    Coff,
}

impl fmt::Display for ObjectFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectFormat::Elf => write!(f, "ELF"),
            ObjectFormat::Coff => write!(f, "COFF"),
        }
    }
}

/// A file-backed region of the loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Virtual address the region is loaded at
    pub vaddr: Address,
    /// Size in memory
    pub memsz: Address,
    /// File offset of the region's first byte
    pub offset: Address,
    /// Bytes present in the file
    pub filesz: Address,
}

impl Segment {
    fn maps_virtual(&self, virt: Address) -> bool {
        virt >= self.vaddr && virt - self.vaddr < self.filesz.min(self.memsz)
    }

    fn maps_physical(&self, physical: Address) -> bool {
        physical >= self.offset && physical - self.offset < self.filesz.min(self.memsz)
    }
}

/// Translates between virtual addresses and file offsets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSpace {
    segments: Vec<Segment>,
}

impl AddressSpace {
    pub fn new(mut segments: Vec<Segment>) -> Self {
        segments.sort_by_key(|s| s.vaddr);
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// File offset backing `virt`, if any segment maps it from the file.
    pub fn virtual_to_physical(&self, virt: Address) -> Option<Address> {
        self.segments
            .iter()
            .find(|s| s.maps_virtual(virt))
            .and_then(|s| s.offset.checked_add(virt - s.vaddr))
    }

    /// Virtual address `physical` is loaded at, if any segment loads it.
    pub fn physical_to_virtual(&self, physical: Address) -> Option<Address> {
        self.segments
            .iter()
            .find(|s| s.maps_physical(physical))
            .and_then(|s| s.vaddr.checked_add(physical - s.offset))
    }

    /// Virtual range backed by file contents: from where the start of the
    /// file is loaded (or the lowest segment) to the end of the highest
    /// file-backed byte.
    pub fn file_bounds(&self) -> Option<(Address, Address)> {
        let first = self.segments.first()?;
        let low = self.physical_to_virtual(0).unwrap_or(first.vaddr);
        let high = self
            .segments
            .iter()
            .filter_map(|s| s.vaddr.checked_add(s.filesz.min(s.memsz)))
            .max()?;
        Some((low, high))
    }
}

/// A parsed binary together with its raw bytes.
#[derive(Debug, Clone)]
pub struct BinaryImage {
    pub architecture: Architecture,
    pub format: ObjectFormat,
    pub entry_point: Address,
    pub space: AddressSpace,
    pub data: Vec<u8>,
}

impl BinaryImage {
    /// Read and parse a binary from disk.
    pub fn load(path: &Path) -> EvalResult<Self> {
        let data = fs::read(path)?;
        GoblinParser::new().parse(data)
    }
}

/// A parser that handles ELF and PE/COFF via Goblin.
#[derive(Debug, Default)]
pub struct GoblinParser;

impl GoblinParser {
    /// Construct a new GoblinParser.
    pub fn new() -> Self {
        GoblinParser
    }

    /// Parse `data`, taking ownership so the image can be decoded later.
    pub fn parse(&self, data: Vec<u8>) -> EvalResult<BinaryImage> {
        let (architecture, format, entry_point, segments) = match Object::parse(&data) {
            Ok(Object::Elf(elf)) => self.parse_elf(&elf),
            Ok(Object::PE(pe)) => self.parse_pe(&pe)?,
            Ok(_) => return Err(EvalError::Parsing("Unsupported file format".into())),
            Err(e) => return Err(EvalError::Parsing(e.to_string())),
        };
        log::debug!(
            "parsed {} image: {} with {} mapped regions",
            format,
            architecture,
            segments.len()
        );
        Ok(BinaryImage {
            architecture,
            format,
            entry_point,
            space: AddressSpace::new(segments),
            data,
        })
    }

    /// Loadable program headers of an ELF image.
    fn parse_elf(&self, elf: &elf::Elf) -> (Architecture, ObjectFormat, Address, Vec<Segment>) {
        let arch = match elf.header.e_machine {
            elf::header::EM_386 => Architecture::X86_32,
            elf::header::EM_X86_64 => Architecture::X86_64,
            elf::header::EM_ARM => Architecture::Arm,
            elf::header::EM_AARCH64 => Architecture::AArch64,
            _ => Architecture::Unknown,
        };

        let segments = elf
            .program_headers
            .iter()
            .filter(|ph| ph.p_type == elf::program_header::PT_LOAD)
            .map(|ph| Segment {
                vaddr: ph.p_vaddr,
                memsz: ph.p_memsz,
                offset: ph.p_offset,
                filesz: ph.p_filesz,
            })
            .collect();

        (arch, ObjectFormat::Elf, elf.entry, segments)
    }

    /// Section table of a PE image, rebased onto the preferred image base.
    fn parse_pe(&self, pe: &pe::PE<'_>) -> EvalResult<(Architecture, ObjectFormat, Address, Vec<Segment>)> {
        let arch = match pe.header.coff_header.machine {
            pe::header::COFF_MACHINE_X86 => Architecture::X86_32,
            pe::header::COFF_MACHINE_X86_64 => Architecture::X86_64,
            pe::header::COFF_MACHINE_ARM => Architecture::Arm,
            pe::header::COFF_MACHINE_ARM64 => Architecture::AArch64,
            _ => Architecture::Unknown,
        };

        let image_base = pe.image_base as Address;
        let segments = pe
            .sections
            .iter()
            .filter(|sect| sect.size_of_raw_data > 0)
            .filter_map(|sect| {
                let Some(vaddr) = rebase(image_base, sect.virtual_address as Address) else {
                    log::warn!("dropping section at RVA 0x{:x}: past the address space", sect.virtual_address);
                    return None;
                };
                Some(Segment {
                    vaddr,
                    // Some linkers leave VirtualSize at zero.
                    memsz: if sect.virtual_size == 0 {
                        sect.size_of_raw_data as Address
                    } else {
                        sect.virtual_size as Address
                    },
                    offset: sect.pointer_to_raw_data as Address,
                    filesz: sect.size_of_raw_data as Address,
                })
            })
            .collect();

        let entry = rebase(image_base, pe.entry as Address).ok_or_else(|| {
            EvalError::Parsing(format!("entry RVA 0x{:x} overflows image base 0x{image_base:x}", pe.entry))
        })?;
        Ok((arch, ObjectFormat::Coff, entry, segments))
    }
}

/// Virtual address of `rva` in an image loaded at `image_base`.
fn rebase(image_base: Address, rva: Address) -> Option<Address> {
    image_base.checked_add(rva)
}

impl fmt::Display for GoblinParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GoblinParser")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_does_not_overflow() {
        let space = AddressSpace::new(vec![Segment {
            vaddr: 0x1000,
            memsz: 0x100,
            offset: Address::MAX - 4,
            filesz: 0x100,
        }]);
        assert_eq!(space.virtual_to_physical(0x1002), Some(Address::MAX - 2));
        assert_eq!(space.virtual_to_physical(0x1010), None);

        assert_eq!(rebase(0x400000, 0x1000), Some(0x401000));
        assert_eq!(rebase(Address::MAX - 0xff, 0x1000), None);
    }

    fn two_segments() -> AddressSpace {
        AddressSpace::new(vec![
            Segment {
                vaddr: 0x402000,
                memsz: 0x1000,
                offset: 0x2000,
                filesz: 0x800,
            },
            Segment {
                vaddr: 0x400000,
                memsz: 0x1000,
                offset: 0x0,
                filesz: 0x1000,
            },
        ])
    }

    #[test]
    fn test_virtual_to_physical() {
        let space = two_segments();
        assert_eq!(space.segments()[0].vaddr, 0x400000);
        assert_eq!(space.virtual_to_physical(0x400010), Some(0x10));
        assert_eq!(space.virtual_to_physical(0x402100), Some(0x2100));
        // Zero-fill tail of the second segment has no file bytes.
        assert_eq!(space.virtual_to_physical(0x402900), None);
        assert_eq!(space.virtual_to_physical(0x3fffff), None);
    }

    #[test]
    fn test_file_bounds() {
        assert_eq!(two_segments().file_bounds(), Some((0x400000, 0x402800)));
        assert_eq!(AddressSpace::default().file_bounds(), None);
    }

    #[test]
    fn test_physical_to_virtual() {
        let space = two_segments();
        assert_eq!(space.physical_to_virtual(0x10), Some(0x400010));
        assert_eq!(space.physical_to_virtual(0x2004), Some(0x402004));
        assert_eq!(space.physical_to_virtual(0x1800), None);
    }

    #[test]
    fn test_rejects_garbage() {
        let err = GoblinParser::new().parse(vec![0u8; 64]).unwrap_err();
        assert!(matches!(err, EvalError::Parsing(_)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parse_running_executable() {
        let exe = std::env::current_exe().expect("current exe");
        let image = BinaryImage::load(&exe).expect("parse test binary");

        assert_eq!(image.format, ObjectFormat::Elf);
        assert!(!image.space.segments().is_empty());
        // A non-PIE entry is a plain address; a PIE entry is relative to a
        // zero base. Either way it lies in a mapped region.
        let entry = image.space.virtual_to_physical(image.entry_point);
        assert!(entry.is_some(), "entry 0x{:x} not mapped", image.entry_point);
        assert!((entry.unwrap() as usize) < image.data.len());
    }
}
