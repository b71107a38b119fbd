//! Value types shared across the pipeline.

mod difficulty;

pub use difficulty::{BestDiff, ParseBestDiffError, Suffix, group_thousands};
