mod engine;
mod statistics;

pub use engine::TallyEngine;
pub use statistics::{compute_statistics, ActivityHeader, OptionStat, Statistics, Totals};
