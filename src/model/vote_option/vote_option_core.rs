use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::Id;

/// A candidate or choice belonging to exactly one activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOption {
    #[serde(rename = "_id")]
    pub id: Id,
    pub activity_id: Id,
    /// Display name, also used to label tallies.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl VoteOption {
    pub fn new(activity_id: Id, name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id: Id::new(),
            activity_id,
            name: name.into(),
            description,
        }
    }
}

/// An option as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl OptionSpec {
    pub fn into_option(self, activity_id: Id) -> Result<VoteOption> {
        Ok(VoteOption::new(
            activity_id,
            checked_name(self.name)?,
            self.description,
        ))
    }
}

/// A partial update to an option's display payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl OptionPatch {
    pub fn apply(self, mut option: VoteOption) -> Result<VoteOption> {
        if let Some(name) = self.name {
            option.name = checked_name(name)?;
        }
        if let Some(description) = self.description {
            option.description = Some(description);
        }
        Ok(option)
    }
}

fn checked_name(name: String) -> Result<String> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(Error::Status(
            rocket::http::Status::BadRequest,
            "Option name must not be empty".to_string(),
        ));
    }
    Ok(name)
}

/// An option as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDescription {
    pub id: String,
    pub activity_id: String,
    pub name: String,
    pub description: Option<String>,
}

impl From<VoteOption> for OptionDescription {
    fn from(option: VoteOption) -> Self {
        Self {
            id: option.id.to_hex(),
            activity_id: option.activity_id.to_hex(),
            name: option.name,
            description: option.description,
        }
    }
}
