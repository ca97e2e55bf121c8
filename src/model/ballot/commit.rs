use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use mongodb::{Client as MongoClient, Database};
use rocket::{
    futures::FutureExt,
    request::{self, FromRequest, Request},
    State,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    activity::ActivityRegistry,
    mongodb::{is_duplicate_key_error, with_transaction, Coll},
    roster::Roster,
    vote_option::OptionCatalog,
};

use super::{
    admission::{admit, check_payload, AdmissionContext},
    ballot_core::{Ballot, ProofToken},
    submission::BallotSubmission,
};

/// Fresh tokens tried before a collision is surfaced as a server error.
const TOKEN_ATTEMPTS: usize = 2;

/// Where proof tokens come from.
type TokenSource = Arc<dyn Fn() -> ProofToken + Send + Sync>;

/// Admits ballots and commits them, detached from the identity that cast them.
#[derive(Clone)]
pub struct BallotBox {
    registry: ActivityRegistry,
    catalog: OptionCatalog,
    ballots: Coll<Ballot>,
    tokens: TokenSource,
}

impl BallotBox {
    pub fn new(client: &MongoClient, db: &Database, max_attempts: u32) -> Self {
        Self {
            registry: ActivityRegistry::new(client, db, max_attempts),
            catalog: OptionCatalog::new(client, db, max_attempts),
            ballots: Coll::from_db(db),
            tokens: Arc::new(|| ProofToken::generate(rand::thread_rng())),
        }
    }

    /// Draw proof tokens from `source` instead of the thread RNG.
    pub fn with_tokens(mut self, source: impl Fn() -> ProofToken + Send + Sync + 'static) -> Self {
        self.tokens = Arc::new(source);
        self
    }

    /// Run a submission through admission and, if accepted, commit the
    /// ballot and the voted flag together.
    ///
    /// `roster` is the eligibility snapshot used for the whole submission.
    /// Returns the proof token, the only trace of the ballot the voter gets.
    pub async fn cast(
        &self,
        roster: Arc<Roster>,
        identity: &str,
        submission: &BallotSubmission,
    ) -> Result<ProofToken> {
        let declared = check_payload(submission)?;

        for attempt in 1..=TOKEN_ATTEMPTS {
            let token = (self.tokens)();
            let ballot_box = self.clone();
            let declared = declared.clone();
            let roster = roster.clone();
            let identity = identity.to_string();

            let outcome = with_transaction(
                self.registry.client(),
                self.registry.max_attempts(),
                move |session| {
                    let ballot_box = ballot_box.clone();
                    let declared = declared.clone();
                    let roster = roster.clone();
                    let identity = identity.clone();
                    let token = token.clone();
                    async move {
                        let eligible = roster.contains(&identity);
                        let (activity, options, already_voted) = match declared.activity_id {
                            Some(id) if eligible => {
                                let activity = ballot_box.registry.find_with_session(id, session).await?;
                                let options = ballot_box.catalog.list_with_session(id, session).await?;
                                let voted = ballot_box
                                    .registry
                                    .has_voted_with_session(id, &identity, session)
                                    .await?;
                                (activity, options, voted)
                            }
                            _ => (None, Vec::new(), false),
                        };

                        let admitted = admit(
                            &declared,
                            &AdmissionContext {
                                eligible,
                                activity: activity.as_ref(),
                                options: &options,
                                already_voted,
                                now: Utc::now(),
                            },
                        )?;

                        let ballot = Ballot::new(token, admitted.activity_id, admitted.selections);
                        match ballot_box
                            .ballots
                            .insert_one_with_session(&ballot, None, session)
                            .await
                        {
                            Ok(_) => {}
                            Err(e) if is_duplicate_key_error(&e) => return Err(Error::TokenCollision),
                            Err(e) => return Err(e.into()),
                        }
                        ballot_box
                            .registry
                            .record_voted(admitted.activity_id, &identity, session)
                            .await?;

                        Ok((ballot.activity_id, ballot.token))
                    }
                    .boxed()
                },
            )
            .await;

            match outcome {
                Ok((activity_id, token)) => {
                    info!("Committed a ballot in activity {activity_id}");
                    return Ok(token);
                }
                Err(Error::TokenCollision) => {
                    warn!("Proof token collision on attempt {attempt}, drawing a new token");
                }
                Err(err) => {
                    if let Some(reason) = err.as_vote() {
                        debug!("Ballot refused: {}", reason.kind());
                    }
                    return Err(err);
                }
            }
        }

        Err(Error::TokenCollision)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for BallotBox {
    type Error = ();

    /// Build the ballot box from managed state.
    ///
    /// Panics iff the database or config is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let client = req.guard::<&State<MongoClient>>().await.unwrap();
        let db = req.guard::<&State<Database>>().await.unwrap();
        let config = req.guard::<&State<Config>>().await.unwrap();
        request::Outcome::Success(Self::new(client, db, config.commit_attempts()))
    }
}
