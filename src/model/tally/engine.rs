use mongodb::{bson::doc, Client as MongoClient, Database};
use rocket::{
    futures::FutureExt,
    request::{self, FromRequest, Request},
    State,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    activity::ActivityRegistry,
    ballot::Ballot,
    mongodb::{with_transaction, Coll, Id},
    roster::Roster,
    vote_option::OptionCatalog,
};

use super::statistics::{compute_statistics, Statistics};

/// Reads an activity, its options and its ballots from one snapshot and
/// folds them into [`Statistics`]. Never writes.
#[derive(Clone)]
pub struct TallyEngine {
    registry: ActivityRegistry,
    catalog: OptionCatalog,
    ballots: Coll<Ballot>,
}

impl TallyEngine {
    pub fn new(client: &MongoClient, db: &Database, max_attempts: u32) -> Self {
        Self {
            registry: ActivityRegistry::new(client, db, max_attempts),
            catalog: OptionCatalog::new(client, db, max_attempts),
            ballots: Coll::from_db(db),
        }
    }

    /// `roster` supplies the eligible-voter count used for turnout.
    pub async fn compute(&self, id: Id, roster: &Roster) -> Result<Statistics> {
        let eligible = roster.len() as u64;
        let engine = self.clone();
        with_transaction(
            self.registry.client(),
            self.registry.max_attempts(),
            move |session| {
                let engine = engine.clone();
                async move {
                    let activity = engine
                        .registry
                        .find_with_session(id, session)
                        .await?
                        .ok_or_else(|| Error::not_found(format!("Activity {id}")))?;
                    let options = engine.catalog.list_with_session(id, session).await?;
                    let voted = engine.registry.voted_count_with_session(id, session).await?;

                    let mut cursor = engine
                        .ballots
                        .find_with_session(doc! { "activity_id": id }, None, session)
                        .await?;
                    let mut ballots = Vec::new();
                    while let Some(ballot) = cursor.next(session).await {
                        ballots.push(ballot?);
                    }

                    Ok(compute_statistics(&activity, &options, &ballots, eligible, voted))
                }
                .boxed()
            },
        )
        .await
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for TallyEngine {
    type Error = ();

    /// Build the engine from managed state.
    ///
    /// Panics iff the database or config is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let client = req.guard::<&State<MongoClient>>().await.unwrap();
        let db = req.guard::<&State<Database>>().await.unwrap();
        let config = req.guard::<&State<Config>>().await.unwrap();
        request::Outcome::Success(Self::new(client, db, config.commit_attempts()))
    }
}
