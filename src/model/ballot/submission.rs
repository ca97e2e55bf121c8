use serde::{Deserialize, Serialize};

/// A ballot as it arrives over the wire. Nothing here is trusted: every
/// field is re-validated by [`admission`](super::admission). The voter's
/// identity is never part of the body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BallotSubmission {
    pub activity_id: String,
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choose_all: Option<Vec<RemarkSubmission>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choose_one: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemarkSubmission {
    pub option_id: String,
    pub remark: String,
}

/// The response to a committed ballot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallotReceipt {
    pub token: String,
}

impl BallotSubmission {
    pub fn choose_one(activity_id: impl ToString, option_id: impl ToString) -> Self {
        Self {
            activity_id: activity_id.to_string(),
            rule: "choose_one".to_string(),
            choose_all: None,
            choose_one: Some(option_id.to_string()),
        }
    }

    pub fn choose_all<I, O, R>(activity_id: impl ToString, remarks: I) -> Self
    where
        I: IntoIterator<Item = (O, R)>,
        O: ToString,
        R: ToString,
    {
        Self {
            activity_id: activity_id.to_string(),
            rule: "choose_all".to_string(),
            choose_all: Some(
                remarks
                    .into_iter()
                    .map(|(option_id, remark)| RemarkSubmission {
                        option_id: option_id.to_string(),
                        remark: remark.to_string(),
                    })
                    .collect(),
            ),
            choose_one: None,
        }
    }
}
