//! Output module for `--stats` reports

pub mod stats;

pub use stats::{load_statistics, print_statistics, HarvestStatistics};
