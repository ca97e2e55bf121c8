use jsonwebtoken::errors::Error as JwtError;
use log::{debug, error, warn};
use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reasons a voting operation can be refused.
///
/// Every variant is a business or validation outcome that is reported
/// to the caller verbatim and must never be retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    #[error("Unknown voting rule: {0}")]
    InvalidRule(String),
    #[error("Invalid voting window: {0}")]
    InvalidWindow(String),
    #[error("No selection was submitted for the declared rule")]
    MissingSelection,
    #[error("Unknown remark: {0}")]
    InvalidRemark(String),
    #[error("The submitted options do not match this activity")]
    InvalidOptions,
    #[error("Invalid roster entries: {}", .0.join(", "))]
    InvalidFormat(Vec<String>),
    #[error("The roster contains no identities")]
    EmptyRoster,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not eligible to vote")]
    NotEligible,
    #[error("Activity not found")]
    ActivityNotFound,
    #[error("Already voted in this activity")]
    AlreadyVoted,
    #[error("The ballot rule does not match the activity rule")]
    RuleMismatch,
    #[error("Voting has not started yet")]
    NotStarted,
    #[error("Voting has ended")]
    VotingEnded,
    #[error("No previous roster to roll back to")]
    NoBackup,
    #[error("Activity {0} already has ballots")]
    ActivityHasBallots(String),
}

impl VoteError {
    /// Stable machine-readable name of this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRule(_) => "InvalidRule",
            Self::InvalidWindow(_) => "InvalidWindow",
            Self::MissingSelection => "MissingSelection",
            Self::InvalidRemark(_) => "InvalidRemark",
            Self::InvalidOptions => "InvalidOptions",
            Self::InvalidFormat(_) => "InvalidFormat",
            Self::EmptyRoster => "EmptyRoster",
            Self::NotFound(_) => "NotFound",
            Self::NotEligible => "NotEligible",
            Self::ActivityNotFound => "ActivityNotFound",
            Self::AlreadyVoted => "AlreadyVoted",
            Self::RuleMismatch => "RuleMismatch",
            Self::NotStarted => "NotStarted",
            Self::VotingEnded => "VotingEnded",
            Self::NoBackup => "NoBackup",
            Self::ActivityHasBallots(_) => "ActivityHasBallots",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::NotFound(_) | Self::ActivityNotFound | Self::NoBackup => Status::NotFound,
            Self::NotEligible => Status::Forbidden,
            Self::ActivityHasBallots(_) => Status::Conflict,
            _ => Status::BadRequest,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Vote(#[from] VoteError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("Generated proof token already exists")]
    TokenCollision,
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::Vote(VoteError::NotFound(what.into()))
    }

    /// The underlying domain error, if this is one.
    pub fn as_vote(&self) -> Option<&VoteError> {
        match self {
            Self::Vote(err) => Some(err),
            _ => None,
        }
    }
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    error: &'static str,
    message: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let (status, body) = match self {
            Self::Vote(err) => {
                debug!("Refused: {err}");
                (
                    err.status(),
                    ErrorBody {
                        error: err.kind(),
                        message: err.to_string(),
                    },
                )
            }
            Self::Db(err) => {
                error!("Database error: {err}");
                (
                    Status::InternalServerError,
                    ErrorBody {
                        error: "Internal",
                        message: "failed to process request".to_string(),
                    },
                )
            }
            Self::TokenCollision => {
                error!("Proof token collided twice in a row");
                (
                    Status::InternalServerError,
                    ErrorBody {
                        error: "Internal",
                        message: "failed to process vote".to_string(),
                    },
                )
            }
            Self::Jwt(err) => {
                warn!("Rejected session token: {err}");
                (
                    Status::Unauthorized,
                    ErrorBody {
                        error: "Unauthorized",
                        message: "invalid session".to_string(),
                    },
                )
            }
            Self::Status(status, message) => {
                if status.code >= 500 {
                    error!("{status}: {message}");
                }
                (
                    status,
                    ErrorBody {
                        error: status.reason().unwrap_or("Error"),
                        message,
                    },
                )
            }
        };

        response::status::Custom(status, Json(body)).respond_to(req)
    }
}

/// Renders failures raised by Rocket itself, such as unparsable bodies,
/// failed guards and unknown routes, in the same body shape.
#[catch(default)]
pub(crate) fn default_catcher(
    status: Status,
    _req: &Request<'_>,
) -> response::status::Custom<Json<ErrorBody>> {
    let error = match status.code {
        400 | 422 => "MalformedRequest",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "NotFound",
        413 => "PayloadTooLarge",
        500..=599 => "Internal",
        _ => status.reason().unwrap_or("Error"),
    };
    let body = ErrorBody {
        error,
        message: status.reason().unwrap_or("Error").to_string(),
    };
    response::status::Custom(status, Json(body))
}
