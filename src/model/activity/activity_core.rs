use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, SubsecRound, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, Bson};
use serde::{Deserialize, Serialize};

use crate::error::VoteError;
use crate::model::mongodb::Id;

/// How a ballot expresses preferences for the options of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingRule {
    /// Support, oppose or stay neutral on every option independently.
    ChooseAll,
    /// Pick exactly one option.
    ChooseOne,
}

impl FromStr for VotingRule {
    type Err = VoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("choose_all") {
            Ok(Self::ChooseAll)
        } else if s.eq_ignore_ascii_case("choose_one") {
            Ok(Self::ChooseOne)
        } else {
            Err(VoteError::InvalidRule(s.to_string()))
        }
    }
}

impl Display for VotingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ChooseAll => "choose_all",
            Self::ChooseOne => "choose_one",
        })
    }
}

impl From<VotingRule> for Bson {
    fn from(rule: VotingRule) -> Self {
        Bson::String(rule.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    #[default]
    Election,
    Referendum,
}

/// Where an instant falls relative to an activity's voting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    Upcoming,
    Open,
    Closed,
}

/// Both ends of a voting window. Always satisfies `open_from < open_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotingWindow {
    open_from: DateTime<Utc>,
    open_to: DateTime<Utc>,
}

impl VotingWindow {
    pub fn new(open_from: DateTime<Utc>, open_to: DateTime<Utc>) -> Result<Self, VoteError> {
        if open_from >= open_to {
            return Err(VoteError::InvalidWindow(format!(
                "open_from ({open_from}) must be before open_to ({open_to})"
            )));
        }
        Ok(Self { open_from, open_to })
    }

    pub fn open_from(&self) -> DateTime<Utc> {
        self.open_from
    }

    pub fn open_to(&self) -> DateTime<Utc> {
        self.open_to
    }

    /// Both bounds are inclusive.
    pub fn status_at(&self, now: DateTime<Utc>) -> WindowStatus {
        if now < self.open_from {
            WindowStatus::Upcoming
        } else if now > self.open_to {
            WindowStatus::Closed
        } else {
            WindowStatus::Open
        }
    }
}

/// Parse an RFC 3339 instant as supplied by admin clients.
///
/// Truncated to the millisecond precision the database keeps, so that a
/// window reads back exactly as it was validated.
pub fn parse_instant(field: &str, value: &str) -> Result<DateTime<Utc>, VoteError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc).trunc_subsecs(3))
        .map_err(|e| VoteError::InvalidWindow(format!("{field} '{value}' is not a valid instant: {e}")))
}

/// A voting activity, as stored in the database.
///
/// The identities that have voted are deliberately not part of this
/// document; they live in the participation set (see
/// [`Participation`](crate::model::ballot::Participation)).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "_id")]
    pub id: Id,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub kind: ActivityKind,
    pub rule: VotingRule,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub open_from: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub open_to: DateTime<Utc>,
    /// IDs of this activity's options, in creation order.
    #[serde(default)]
    pub option_ids: Vec<Id>,
}

impl Activity {
    pub fn window(&self) -> VotingWindow {
        VotingWindow {
            open_from: self.open_from,
            open_to: self.open_to,
        }
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> WindowStatus {
        self.window().status_at(now)
    }
}
