mod cache;
mod oracle;
mod parse;

pub use cache::{Roster, RosterCache, RosterCount, RosterStats};
pub use oracle::{EligibilityOracle, RosterSlot, StoredRoster};
pub use parse::{is_valid_identity, parse_roster};
