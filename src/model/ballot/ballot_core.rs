use std::{fmt::Display, str::FromStr};

use data_encoding::BASE32_NOPAD;
use mongodb::bson::{doc, Document};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::VoteError;
use crate::model::{activity::VotingRule, mongodb::Id};

/// Bytes of randomness in a proof token.
const TOKEN_BYTES: usize = 16;

/// A voter's stance on one option under the choose-all rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Remark {
    Support,
    Oppose,
    Neutral,
}

impl FromStr for Remark {
    type Err = VoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUPPORT" => Ok(Self::Support),
            "OPPOSE" => Ok(Self::Oppose),
            "NEUTRAL" => Ok(Self::Neutral),
            _ => Err(VoteError::InvalidRemark(s.to_string())),
        }
    }
}

/// The unguessable receipt handed to a voter, and the only key of their ballot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofToken(String);

impl ProofToken {
    /// Draw a fresh token with 128 bits of entropy.
    pub fn generate(mut rng: impl RngCore + CryptoRng) -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rng.fill_bytes(&mut bytes);
        Self(BASE32_NOPAD.encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProofToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `(option, remark)` entry of a choose-all ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemarkedOption {
    pub option_id: Id,
    pub remark: Remark,
}

/// What was voted for. Exactly one shape per ballot, matching its rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selections {
    ChooseAll(Vec<RemarkedOption>),
    ChooseOne(Id),
}

impl Selections {
    pub fn rule(&self) -> VotingRule {
        match self {
            Self::ChooseAll(_) => VotingRule::ChooseAll,
            Self::ChooseOne(_) => VotingRule::ChooseOne,
        }
    }
}

/// A committed ballot, as stored in the database.
///
/// There is no field naming the voter, and no field shared with
/// [`Participation`] other than the activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(rename = "_id")]
    pub token: ProofToken,
    pub activity_id: Id,
    pub rule: VotingRule,
    pub selections: Selections,
}

impl Ballot {
    pub fn new(token: ProofToken, activity_id: Id, selections: Selections) -> Self {
        Self {
            token,
            activity_id,
            rule: selections.rule(),
            selections,
        }
    }
}

/// The fact that an identity has voted in an activity.
///
/// The compound key doubles as the at-most-once guard: the store refuses a
/// second document with the same `_id`. It carries no timestamp (unlike an
/// `ObjectId`) so it cannot be lined up against ballot insertion times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    #[serde(rename = "_id")]
    pub key: ParticipationKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationKey {
    pub activity_id: Id,
    pub student_id: String,
}

impl Participation {
    pub fn new(activity_id: Id, student_id: impl Into<String>) -> Self {
        Self {
            key: ParticipationKey {
                activity_id,
                student_id: student_id.into(),
            },
        }
    }

    /// Filter matching the participation of `student_id` in `activity_id`.
    pub fn key_doc(activity_id: Id, student_id: &str) -> Document {
        doc! {
            "_id": {
                "activity_id": activity_id,
                "student_id": student_id,
            }
        }
    }

    /// Filter matching every participation in `activity_id`.
    pub fn activity_doc(activity_id: Id) -> Document {
        doc! { "_id.activity_id": activity_id }
    }
}
