mod catalog;
mod vote_option_core;

pub use catalog::OptionCatalog;
pub use vote_option_core::{OptionDescription, OptionPatch, OptionSpec, VoteOption};
