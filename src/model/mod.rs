pub mod activity;
pub mod auth;
pub mod ballot;
pub mod mongodb;
pub mod roster;
pub mod tally;
pub mod vote_option;
