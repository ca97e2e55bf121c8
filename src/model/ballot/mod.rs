pub mod admission;
mod ballot_core;
mod commit;
mod submission;

pub use ballot_core::{
    Ballot, Participation, ParticipationKey, ProofToken, Remark, RemarkedOption, Selections,
};
pub use commit::BallotBox;
pub use submission::{BallotReceipt, BallotSubmission, RemarkSubmission};
