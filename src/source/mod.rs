//! Readers for the two inputs of a scoring pass: ground truth and the
//! addresses reported by a tool under test.

mod candidates;
mod ground_truth;

pub use self::candidates::*;
pub use self::ground_truth::*;
