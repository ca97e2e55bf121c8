use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{mongodb::Id, vote_option::OptionDescription};

use super::activity_core::{
    parse_instant, Activity, ActivityKind, VotingRule, VotingWindow, WindowStatus,
};

/// An activity as submitted by an admin. Rule and instants are kept as raw
/// strings so that bad values surface as domain errors rather than as
/// generic deserialisation failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySpec {
    pub name: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: ActivityKind,
    pub rule: String,
    pub open_from: String,
    pub open_to: String,
}

impl ActivitySpec {
    /// Validate this spec and turn it into a new activity with no options.
    pub fn into_activity(self) -> Result<Activity> {
        let name = checked_name(self.name)?;
        let rule: VotingRule = self.rule.parse()?;
        let window = VotingWindow::new(
            parse_instant("open_from", &self.open_from)?,
            parse_instant("open_to", &self.open_to)?,
        )?;

        Ok(Activity {
            id: Id::new(),
            name,
            subtitle: self.subtitle,
            description: self.description,
            kind: self.kind,
            rule,
            open_from: window.open_from(),
            open_to: window.open_to(),
            option_ids: Vec::new(),
        })
    }
}

/// A partial update to an activity's metadata. Absent fields are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<ActivityKind>,
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default)]
    pub open_from: Option<String>,
    #[serde(default)]
    pub open_to: Option<String>,
}

impl ActivityPatch {
    /// Does this patch try to change the voting rule of `activity`?
    pub fn changes_rule(&self, activity: &Activity) -> Result<bool> {
        match &self.rule {
            Some(rule) => Ok(rule.parse::<VotingRule>()? != activity.rule),
            None => Ok(false),
        }
    }

    /// Apply this patch, validating the merged window as a whole.
    pub fn apply(self, mut activity: Activity) -> Result<Activity> {
        if let Some(rule) = self.rule {
            activity.rule = rule.parse()?;
        }
        let open_from = match self.open_from {
            Some(value) => parse_instant("open_from", &value)?,
            None => activity.open_from,
        };
        let open_to = match self.open_to {
            Some(value) => parse_instant("open_to", &value)?,
            None => activity.open_to,
        };
        let window = VotingWindow::new(open_from, open_to)?;
        activity.open_from = window.open_from();
        activity.open_to = window.open_to();

        if let Some(name) = self.name {
            activity.name = checked_name(name)?;
        }
        if let Some(subtitle) = self.subtitle {
            activity.subtitle = Some(subtitle);
        }
        if let Some(description) = self.description {
            activity.description = Some(description);
        }
        if let Some(kind) = self.kind {
            activity.kind = kind;
        }
        Ok(activity)
    }
}

fn checked_name(name: String) -> Result<String> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(Error::Status(
            rocket::http::Status::BadRequest,
            "Activity name must not be empty".to_string(),
        ));
    }
    Ok(name)
}

/// An activity as shown to clients. The voted set is never exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityDescription {
    pub id: String,
    pub name: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub rule: VotingRule,
    pub open_from: DateTime<Utc>,
    pub open_to: DateTime<Utc>,
    pub status: WindowStatus,
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_details: Option<Vec<OptionDescription>>,
}

impl ActivityDescription {
    pub fn new(activity: Activity, now: DateTime<Utc>) -> Self {
        let status = activity.status_at(now);
        Self {
            id: activity.id.to_hex(),
            name: activity.name,
            subtitle: activity.subtitle,
            description: activity.description,
            kind: activity.kind,
            rule: activity.rule,
            open_from: activity.open_from,
            open_to: activity.open_to,
            status,
            options: activity.option_ids.iter().map(Id::to_hex).collect(),
            option_details: None,
        }
    }

    pub fn with_options(mut self, options: Vec<OptionDescription>) -> Self {
        self.option_details = Some(options);
        self
    }
}

/// One line of the activity listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub id: String,
    pub name: String,
    pub subtitle: Option<String>,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub rule: VotingRule,
    pub open_from: DateTime<Utc>,
    pub open_to: DateTime<Utc>,
    pub status: WindowStatus,
}

impl ActivitySummary {
    pub fn new(activity: Activity, now: DateTime<Utc>) -> Self {
        let status = activity.status_at(now);
        Self {
            id: activity.id.to_hex(),
            name: activity.name,
            subtitle: activity.subtitle,
            kind: activity.kind,
            rule: activity.rule,
            open_from: activity.open_from,
            open_to: activity.open_to,
            status,
        }
    }
}
