//! Ground truth, function boundaries, candidates and match outcomes.
//!
//! Every sequence type here validates its ordering invariant on construction,
//! so the matcher can rely on sorted input without re-checking it.

use serde::Serialize;

use crate::{Address, EvalError, EvalResult, Sequence};

/// One ground-truth instruction start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsnRecord {
    /// Address of the instruction
    pub offset: Address,
    /// Whether a tool may skip this instruction without penalty
    pub optional: bool,
}

impl InsnRecord {
    pub fn new(offset: Address, optional: bool) -> Self {
        Self { offset, optional }
    }

    /// An instruction that must be detected.
    pub fn mandatory(offset: Address) -> Self {
        Self::new(offset, false)
    }

    /// An instruction whose detection is neither rewarded nor penalised.
    pub fn optional(offset: Address) -> Self {
        Self::new(offset, true)
    }
}

/// A function body, half-open `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncRange {
    pub start: Address,
    pub end: Address,
}

impl FuncRange {
    pub fn new(start: Address, end: Address) -> Self {
        Self { start, end }
    }
}

/// Ground-truth instructions, strictly increasing by offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundTruth {
    records: Vec<InsnRecord>,
}

impl GroundTruth {
    /// Wrap records that are already sorted and unique.
    pub fn new(records: Vec<InsnRecord>) -> EvalResult<Self> {
        for (index, pair) in records.windows(2).enumerate() {
            if pair[1].offset <= pair[0].offset {
                return Err(EvalError::InvariantViolation {
                    sequence: Sequence::GroundTruth,
                    index: index + 1,
                    detail: format!(
                        "offset 0x{:x} does not follow 0x{:x}",
                        pair[1].offset, pair[0].offset
                    ),
                });
            }
        }
        Ok(Self { records })
    }

    /// Sort records by offset and keep the first record for each offset.
    pub fn from_unsorted(mut records: Vec<InsnRecord>) -> Self {
        records.sort_by_key(|r| r.offset);
        records.dedup_by_key(|r| r.offset);
        Self { records }
    }

    pub fn records(&self) -> &[InsnRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of instructions a tool is required to find.
    pub fn mandatory_count(&self) -> usize {
        self.records.iter().filter(|r| !r.optional).count()
    }
}

/// Function bodies, strictly increasing by start and non-overlapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionRanges {
    ranges: Vec<FuncRange>,
}

impl FunctionRanges {
    pub fn new(ranges: Vec<FuncRange>) -> EvalResult<Self> {
        let violation = |index: usize, detail: String| EvalError::InvariantViolation {
            sequence: Sequence::FunctionRanges,
            index,
            detail,
        };

        for (index, range) in ranges.iter().enumerate() {
            if range.end < range.start {
                return Err(violation(
                    index,
                    format!("end 0x{:x} precedes start 0x{:x}", range.end, range.start),
                ));
            }
        }
        for (index, pair) in ranges.windows(2).enumerate() {
            if pair[1].start <= pair[0].start {
                return Err(violation(
                    index + 1,
                    format!(
                        "start 0x{:x} does not follow 0x{:x}",
                        pair[1].start, pair[0].start
                    ),
                ));
            }
            if pair[0].end > pair[1].start {
                return Err(violation(
                    index + 1,
                    format!(
                        "range starting at 0x{:x} overlaps previous range ending at 0x{:x}",
                        pair[1].start, pair[0].end
                    ),
                ));
            }
        }
        Ok(Self { ranges })
    }

    /// Sort ranges by start, then validate.
    pub fn from_unsorted(mut ranges: Vec<FuncRange>) -> EvalResult<Self> {
        ranges.sort_by_key(|r| (r.start, r.end));
        ranges.dedup();
        Self::new(ranges)
    }

    pub fn ranges(&self) -> &[FuncRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Addresses reported by the tool under test, non-decreasing.
///
/// Duplicates are kept; the matcher treats each one independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    addrs: Vec<Address>,
}

impl Candidates {
    pub fn new(addrs: Vec<Address>) -> EvalResult<Self> {
        if let Some(index) = addrs.windows(2).position(|pair| pair[1] < pair[0]) {
            return Err(EvalError::InvariantViolation {
                sequence: Sequence::Candidates,
                index: index + 1,
                detail: format!(
                    "address 0x{:x} follows 0x{:x}",
                    addrs[index + 1],
                    addrs[index]
                ),
            });
        }
        Ok(Self { addrs })
    }

    pub fn from_unsorted(mut addrs: Vec<Address>) -> Self {
        addrs.sort_unstable();
        Self { addrs }
    }

    pub fn addrs(&self) -> &[Address] {
        &self.addrs
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

/// True positive, false positive and false negative counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl MatchOutcome {
    pub fn new(tp: usize, fp: usize, fn_: usize) -> Self {
        Self { tp, fp, fn_ }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_truth_rejects_duplicates() {
        let err = GroundTruth::new(vec![
            InsnRecord::mandatory(0x10),
            InsnRecord::optional(0x10),
        ])
        .unwrap_err();

        match err {
            EvalError::InvariantViolation { sequence, index, .. } => {
                assert_eq!(sequence, Sequence::GroundTruth);
                assert_eq!(index, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ground_truth_from_unsorted() {
        let truth = GroundTruth::from_unsorted(vec![
            InsnRecord::mandatory(0x30),
            InsnRecord::optional(0x10),
            InsnRecord::mandatory(0x10),
            InsnRecord::mandatory(0x20),
        ]);

        let offsets: Vec<_> = truth.records().iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0x10, 0x20, 0x30]);
        // The first record seen for an offset wins.
        assert!(truth.records()[0].optional);
        assert_eq!(truth.mandatory_count(), 2);
    }

    #[test]
    fn test_function_ranges_validation() {
        assert!(FunctionRanges::new(vec![FuncRange::new(0, 10), FuncRange::new(10, 20)]).is_ok());
        // Empty bodies are legal.
        assert!(FunctionRanges::new(vec![FuncRange::new(5, 5)]).is_ok());

        assert!(FunctionRanges::new(vec![FuncRange::new(10, 5)]).is_err());
        assert!(FunctionRanges::new(vec![FuncRange::new(10, 20), FuncRange::new(0, 5)]).is_err());
        assert!(FunctionRanges::new(vec![FuncRange::new(0, 15), FuncRange::new(10, 20)]).is_err());
    }

    #[test]
    fn test_function_ranges_from_unsorted() {
        let ranges = FunctionRanges::from_unsorted(vec![
            FuncRange::new(0x200, 0x280),
            FuncRange::new(0x100, 0x180),
            FuncRange::new(0x100, 0x180),
        ])
        .unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges.ranges()[0].start, 0x100);
    }

    #[test]
    fn test_candidates_allow_duplicates() {
        let cands = Candidates::new(vec![1, 2, 2, 3]).unwrap();
        assert_eq!(cands.len(), 4);

        let err = Candidates::new(vec![1, 3, 2]).unwrap_err();
        assert!(err.to_string().contains("index 2"));
    }
}
