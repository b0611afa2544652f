//! Single-pass merge of ground truth against candidate addresses.
//!
//! Three cursors move forward only: one over ground truth, one over the
//! candidates, one over the function ranges. A candidate is scored only when
//! it falls inside a function body; candidates in the gaps between bodies are
//! skipped. Once the candidates run past the last function body the pass
//! stops, and whatever ground truth is left is counted as missed.

use std::cmp::Ordering;
use std::iter::FusedIterator;

use crate::model::{Candidates, FuncRange, FunctionRanges, GroundTruth, InsnRecord, MatchOutcome};
use crate::Address;

/// A scoring event worth showing to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    /// A mandatory ground-truth instruction the tool did not report.
    FalseNegative {
        /// Ground-truth offset
        offset: Address,
    },
    /// A reported address that is not a ground-truth instruction.
    FalsePositive {
        /// Address exactly as the tool reported it
        address: Address,
        /// The same address moved into the ground-truth address space
        adjusted: Address,
    },
}

impl Mismatch {
    /// Address in the ground-truth address space.
    pub fn ground_truth_address(&self) -> Address {
        match *self {
            Mismatch::FalseNegative { offset } => offset,
            Mismatch::FalsePositive { adjusted, .. } => adjusted,
        }
    }

    /// Address to print: the ground-truth offset or the tool's own address.
    pub fn reported_address(&self) -> Address {
        match *self {
            Mismatch::FalseNegative { offset } => offset,
            Mismatch::FalsePositive { address, .. } => address,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mismatch::FalseNegative { .. } => "false negative",
            Mismatch::FalsePositive { .. } => "false positive",
        }
    }
}

/// One scoring pass, consumed as an iterator of [`Mismatch`] events.
///
/// Counting happens as the iterator advances; [`MatchPass::outcome`] reports
/// the counts so far and [`MatchPass::finish`] drives the pass to the end.
/// Missed ground truth left over after the merge loop is counted without
/// producing events.
#[derive(Debug, Clone)]
pub struct MatchPass<'a> {
    truth: &'a [InsnRecord],
    candidates: &'a [Address],
    ranges: &'a [FuncRange],
    address_offset: i64,
    pr: usize,
    pd: usize,
    fi: usize,
    outcome: MatchOutcome,
    done: bool,
}

impl<'a> MatchPass<'a> {
    /// Prepare a pass. `address_offset` is subtracted from every candidate
    /// before comparison.
    pub fn new(
        truth: &'a GroundTruth,
        candidates: &'a Candidates,
        ranges: &'a FunctionRanges,
        address_offset: i64,
    ) -> Self {
        Self {
            truth: truth.records(),
            candidates: candidates.addrs(),
            ranges: ranges.ranges(),
            address_offset,
            pr: 0,
            pd: 0,
            fi: 0,
            outcome: MatchOutcome::default(),
            done: false,
        }
    }

    /// Counts accumulated so far.
    pub fn outcome(&self) -> MatchOutcome {
        self.outcome
    }

    /// Whether the pass has run to completion.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Candidates the pass never looked at. Non-zero after completion means
    /// the ground truth ran out first or the candidates ran past the last
    /// function body.
    pub fn unscored_candidates(&self) -> usize {
        self.candidates.len() - self.pd
    }

    /// Drain the remaining events and return the final counts.
    pub fn finish(mut self) -> MatchOutcome {
        self.by_ref().for_each(drop);
        self.outcome
    }

    fn sweep_remaining(&mut self) {
        let missed = self.truth[self.pr..].iter().filter(|r| !r.optional).count();
        self.outcome.fn_ += missed;
        self.pr = self.truth.len();
        self.done = true;
    }
}

impl Iterator for MatchPass<'_> {
    type Item = Mismatch;

    fn next(&mut self) -> Option<Mismatch> {
        if self.done {
            return None;
        }

        while self.pr < self.truth.len() && self.pd < self.candidates.len() {
            let address = self.candidates[self.pd];
            // Wide arithmetic: any offset is legal, and a negative result
            // simply lands before the first function body.
            let adjusted = i128::from(address) - i128::from(self.address_offset);

            while self.fi < self.ranges.len() && i128::from(self.ranges[self.fi].end) <= adjusted {
                self.fi += 1;
            }
            let Some(range) = self.ranges.get(self.fi) else {
                break;
            };
            if adjusted < i128::from(range.start) {
                self.pd += 1;
                continue;
            }

            // Inside [start, end), so it fits.
            let adjusted = adjusted as Address;
            let record = self.truth[self.pr];
            match record.offset.cmp(&adjusted) {
                Ordering::Equal => {
                    if !record.optional {
                        self.outcome.tp += 1;
                    }
                    self.pr += 1;
                    self.pd += 1;
                }
                Ordering::Less => {
                    self.pr += 1;
                    if !record.optional {
                        self.outcome.fn_ += 1;
                        return Some(Mismatch::FalseNegative {
                            offset: record.offset,
                        });
                    }
                }
                Ordering::Greater => {
                    self.outcome.fp += 1;
                    self.pd += 1;
                    return Some(Mismatch::FalsePositive { address, adjusted });
                }
            }
        }

        self.sweep_remaining();
        None
    }
}

impl FusedIterator for MatchPass<'_> {}

/// Score `candidates` against `truth` inside the given function bodies.
pub fn match_instructions(
    truth: &GroundTruth,
    candidates: &Candidates,
    ranges: &FunctionRanges,
    address_offset: i64,
) -> MatchOutcome {
    MatchPass::new(truth, candidates, ranges, address_offset).finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FuncRange, InsnRecord};
    use rstest::rstest;

    fn truth(records: &[(Address, bool)]) -> GroundTruth {
        GroundTruth::new(
            records
                .iter()
                .map(|&(offset, optional)| InsnRecord::new(offset, optional))
                .collect(),
        )
        .unwrap()
    }

    fn ranges(ranges: &[(Address, Address)]) -> FunctionRanges {
        FunctionRanges::new(ranges.iter().map(|&(s, e)| FuncRange::new(s, e)).collect()).unwrap()
    }

    fn cands(addrs: &[Address]) -> Candidates {
        Candidates::new(addrs.to_vec()).unwrap()
    }

    const M: bool = false;
    const O: bool = true;

    #[rstest]
    #[case::spurious_candidate(&[10, 25, 30], (2, 1, 0))]
    #[case::trailing_sweep(&[10], (1, 0, 1))]
    #[case::nothing_reported(&[], (0, 0, 2))]
    #[case::optional_found(&[10, 20, 30], (2, 0, 0))]
    #[case::first_missed(&[30], (1, 0, 1))]
    fn test_mixed_ground_truth(#[case] reported: &[Address], #[case] expected: (usize, usize, usize)) {
        let gt = truth(&[(10, M), (20, O), (30, M)]);
        let outcome = match_instructions(&gt, &cands(reported), &ranges(&[(0, 100)]), 0);
        assert_eq!((outcome.tp, outcome.fp, outcome.fn_), expected);
    }

    #[test]
    fn test_identical_sequences_score_perfectly() {
        let gt = truth(&[(0x100, M), (0x102, O), (0x105, M), (0x200, M), (0x204, M)]);
        let all: Vec<Address> = gt.records().iter().map(|r| r.offset).collect();
        let fr = ranges(&[(0x100, 0x110), (0x200, 0x210)]);

        let outcome = match_instructions(&gt, &cands(&all), &fr, 0);
        assert_eq!(outcome, MatchOutcome::new(gt.mandatory_count(), 0, 0));
    }

    #[test]
    fn test_disjoint_candidates_are_all_false_positives() {
        let gt = truth(&[(0x110, M), (0x120, M)]);
        let fr = ranges(&[(0x100, 0x130)]);
        let reported = cands(&[0x101, 0x102, 0x111, 0x115]);

        let outcome = match_instructions(&gt, &reported, &fr, 0);
        assert_eq!(outcome.tp, 0);
        assert_eq!(outcome.fp, reported.len());
    }

    #[test]
    fn test_optional_entry_never_counts() {
        let fr = ranges(&[(0, 100)]);
        let reported = cands(&[10, 15, 40]);

        let strict = match_instructions(&truth(&[(10, M), (20, M), (40, M)]), &reported, &fr, 0);
        let relaxed = match_instructions(&truth(&[(10, M), (20, O), (40, M)]), &reported, &fr, 0);

        assert_eq!(relaxed.fn_ + 1, strict.fn_);
        assert_eq!(relaxed.fp, strict.fp);
        assert_eq!(relaxed.tp, strict.tp);
    }

    #[test]
    fn test_gap_candidates_are_ignored() {
        let gt = truth(&[(0x10, M), (0x20, M), (0x48, M)]);
        let fr = ranges(&[(0x10, 0x30), (0x40, 0x50)]);

        let base = match_instructions(&gt, &cands(&[0x10, 0x21, 0x48]), &fr, 0);
        let with_gaps = match_instructions(
            &gt,
            &cands(&[0x0, 0x8, 0x10, 0x21, 0x30, 0x3f, 0x48]),
            &fr,
            0,
        );

        assert_eq!(base, with_gaps);
        assert_eq!(base, MatchOutcome::new(2, 1, 1));
    }

    #[test]
    fn test_candidate_past_last_range_stops_pass() {
        // The pass stops before looking at the candidate, so it is neither
        // matched nor a false positive, while the ground truth is still swept
        // into the false negatives.
        let gt = truth(&[(10, M)]);
        let outcome = match_instructions(&gt, &cands(&[10]), &ranges(&[(0, 5)]), 0);
        assert_eq!(outcome, MatchOutcome::new(0, 0, 1));
    }

    #[test]
    fn test_early_stop_drops_trailing_candidates() {
        let gt = truth(&[(0x10, M), (0x18, M), (0x90, M)]);
        let fr = ranges(&[(0x0, 0x20), (0x80, 0xa0)]);
        let reported = cands(&[0x10, 0x18, 0x200, 0x300]);

        let mut pass = MatchPass::new(&gt, &reported, &fr, 0);
        let events: Vec<_> = pass.by_ref().collect();

        assert!(events.is_empty());
        assert_eq!(pass.outcome(), MatchOutcome::new(2, 0, 1));
        assert_eq!(pass.unscored_candidates(), 2);
    }

    #[test]
    fn test_candidates_after_ground_truth_are_not_scored() {
        let gt = truth(&[(10, M)]);
        let outcome = match_instructions(&gt, &cands(&[10, 10, 12, 50]), &ranges(&[(0, 100)]), 0);
        assert_eq!(outcome, MatchOutcome::new(1, 0, 0));
    }

    #[test]
    fn test_duplicate_candidates_are_scored_independently() {
        let gt = truth(&[(10, M), (20, M)]);
        let outcome = match_instructions(&gt, &cands(&[10, 10, 20]), &ranges(&[(0, 100)]), 0);
        // The second 10 is compared against 20 and is spurious.
        assert_eq!(outcome, MatchOutcome::new(2, 1, 0));
    }

    #[test]
    fn test_address_offset_is_subtracted() {
        let gt = truth(&[(0x1000, M), (0x1004, M)]);
        let fr = ranges(&[(0x1000, 0x1010)]);
        let reported = cands(&[0x401000, 0x401004]);

        assert_eq!(
            match_instructions(&gt, &reported, &fr, 0x400000),
            MatchOutcome::new(2, 0, 0)
        );
        // Without the offset every candidate is past the last body.
        assert_eq!(match_instructions(&gt, &reported, &fr, 0), MatchOutcome::new(0, 0, 2));
    }

    #[test]
    fn test_negative_offset_and_underflow() {
        let gt = truth(&[(0x10, M)]);
        let fr = ranges(&[(0x10, 0x20)]);

        assert_eq!(
            match_instructions(&gt, &cands(&[0x8]), &fr, -8),
            MatchOutcome::new(1, 0, 0)
        );
        // A candidate below the offset lands before every range.
        assert_eq!(
            match_instructions(&gt, &cands(&[0x4, 0x110]), &fr, 0x100),
            MatchOutcome::new(1, 0, 0)
        );
    }

    #[test]
    fn test_events_follow_scoring_order() {
        let gt = truth(&[(10, M), (20, M), (30, O), (40, M)]);
        let fr = ranges(&[(0, 100)]);
        let reported = cands(&[15, 25, 40]);
        // 15: gt 10 missed, then 15 spurious; 25: gt 20 missed, then 25
        // spurious; 40: gt 30 optional skipped silently, then matched.
        let events: Vec<_> = MatchPass::new(&gt, &reported, &fr, 0).collect();

        assert_eq!(
            events,
            vec![
                Mismatch::FalseNegative { offset: 10 },
                Mismatch::FalsePositive { address: 15, adjusted: 15 },
                Mismatch::FalseNegative { offset: 20 },
                Mismatch::FalsePositive { address: 25, adjusted: 25 },
            ]
        );
    }

    #[test]
    fn test_false_positive_keeps_raw_address() {
        let gt = truth(&[(0x20, M)]);
        let fr = ranges(&[(0x0, 0x40)]);
        let reported = cands(&[0x1010, 0x1020]);

        let events: Vec<_> = MatchPass::new(&gt, &reported, &fr, 0x1000).collect();
        assert_eq!(events, vec![Mismatch::FalsePositive { address: 0x1010, adjusted: 0x10 }]);
        assert_eq!(events[0].reported_address(), 0x1010);
        assert_eq!(events[0].ground_truth_address(), 0x10);
    }

    #[test]
    fn test_trailing_sweep_emits_no_events() {
        let gt = truth(&[(10, M), (20, M), (30, M)]);
        let (none, fr) = (Candidates::default(), ranges(&[(0, 100)]));
        let mut pass = MatchPass::new(&gt, &none, &fr, 0);

        assert_eq!(pass.next(), None);
        assert!(pass.is_done());
        assert_eq!(pass.outcome(), MatchOutcome::new(0, 0, 3));
        // Fused: no double counting on repeated polls.
        assert_eq!(pass.next(), None);
        assert_eq!(pass.outcome().fn_, 3);
    }

    #[test]
    fn test_partial_iteration_then_finish() {
        let gt = truth(&[(10, M), (20, M), (30, M)]);
        let fr = ranges(&[(0, 100)]);
        let reported = cands(&[15, 30]);

        let mut pass = MatchPass::new(&gt, &reported, &fr, 0);
        assert_eq!(pass.next(), Some(Mismatch::FalseNegative { offset: 10 }));
        assert_eq!(pass.outcome(), MatchOutcome::new(0, 0, 1));
        assert_eq!(pass.finish(), MatchOutcome::new(1, 1, 2));
    }

    #[test]
    fn test_true_positives_bounded() {
        let gt = truth(&[(1, M), (2, M), (3, M), (4, O)]);
        let reported = cands(&[1, 2, 3, 4]);
        let outcome = match_instructions(&gt, &reported, &ranges(&[(0, 10)]), 0);
        assert!(outcome.tp <= gt.mandatory_count().min(reported.len()));
        assert_eq!(outcome.tp + outcome.fn_, gt.mandatory_count());
    }

    #[test]
    fn test_range_cursor_never_rewinds() {
        // One instruction per function, found, followed by a run of gap
        // candidates before the next function.
        const FUNCS: Address = 100_000;
        let gt = GroundTruth::new((0..FUNCS).map(|i| InsnRecord::mandatory(i * 100)).collect()).unwrap();
        let fr = FunctionRanges::new((0..FUNCS).map(|i| FuncRange::new(i * 100, i * 100 + 10)).collect()).unwrap();
        let mut addrs = Vec::with_capacity(1_100_000);
        for i in 0..FUNCS {
            addrs.push(i * 100);
            if i + 1 < FUNCS {
                addrs.extend((50..60).map(|j| i * 100 + j));
            }
        }
        let reported = Candidates::new(addrs).unwrap();

        let mut pass = MatchPass::new(&gt, &reported, &fr, 0);
        assert_eq!(pass.by_ref().count(), 0);
        assert_eq!(pass.outcome(), MatchOutcome::new(FUNCS as usize, 0, 0));
        assert_eq!(pass.unscored_candidates(), 0);
    }

    #[test]
    fn test_empty_ranges_score_nothing() {
        let gt = truth(&[(1, M), (2, O)]);
        let outcome = match_instructions(&gt, &cands(&[1, 2]), &FunctionRanges::default(), 0);
        assert_eq!(outcome, MatchOutcome::new(0, 0, 1));
    }
}
