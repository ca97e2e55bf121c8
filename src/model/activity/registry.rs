use log::info;
use mongodb::{
    bson::doc,
    options::FindOptions,
    Client as MongoClient, ClientSession, Database,
};
use rocket::{
    futures::{FutureExt, TryStreamExt},
    request::{self, FromRequest, Request},
    State,
};

use crate::config::Config;
use crate::error::{Error, Result, VoteError};
use crate::model::{
    ballot::{Ballot, Participation},
    mongodb::{is_duplicate_key_error, with_transaction, Coll, Id},
    vote_option::VoteOption,
};

use super::{
    activity_core::Activity,
    spec::{ActivityPatch, ActivitySpec},
};

/// The store of voting activities and of who has voted in each.
#[derive(Clone)]
pub struct ActivityRegistry {
    client: MongoClient,
    activities: Coll<Activity>,
    options: Coll<VoteOption>,
    ballots: Coll<Ballot>,
    participations: Coll<Participation>,
    max_attempts: u32,
}

impl ActivityRegistry {
    pub fn new(client: &MongoClient, db: &Database, max_attempts: u32) -> Self {
        Self {
            client: client.clone(),
            activities: Coll::from_db(db),
            options: Coll::from_db(db),
            ballots: Coll::from_db(db),
            participations: Coll::from_db(db),
            max_attempts,
        }
    }

    /// Validate and insert a new activity with no options and nobody voted.
    pub async fn create(&self, spec: ActivitySpec) -> Result<Activity> {
        let activity = spec.into_activity()?;
        self.activities.insert_one(&activity, None).await?;
        info!("Created activity {} ({})", activity.id, activity.name);
        Ok(activity)
    }

    /// Apply a partial update. The rule cannot change once ballots exist.
    pub async fn update(&self, id: Id, patch: ActivityPatch) -> Result<Activity> {
        let registry = self.clone();
        let activity = with_transaction(&self.client, self.max_attempts, move |session| {
            let registry = registry.clone();
            let patch = patch.clone();
            async move {
                let activity = registry
                    .find_with_session(id, session)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("Activity {id}")))?;

                if patch.changes_rule(&activity)? && registry.has_ballots(id, session).await? {
                    return Err(VoteError::ActivityHasBallots(id.to_hex()).into());
                }

                let activity = patch.apply(activity)?;
                registry
                    .activities
                    .replace_one_with_session(id.as_doc(), &activity, None, session)
                    .await?;
                Ok(activity)
            }
            .boxed()
        })
        .await?;

        info!("Updated activity {id}");
        Ok(activity)
    }

    pub async fn get(&self, id: Id) -> Result<Activity> {
        self.activities
            .find_one(id.as_doc(), None)
            .await?
            .ok_or_else(|| Error::not_found(format!("Activity {id}")))
    }

    /// An activity together with its options, in creation order.
    pub async fn get_with_options(&self, id: Id) -> Result<(Activity, Vec<VoteOption>)> {
        let activity = self.get(id).await?;
        let options = self
            .options
            .find(doc! { "activity_id": id }, creation_order())
            .await?
            .try_collect()
            .await?;
        Ok((activity, options))
    }

    /// Every activity, earliest opening first.
    pub async fn list(&self) -> Result<Vec<Activity>> {
        let options = FindOptions::builder()
            .sort(doc! { "open_from": 1, "_id": 1 })
            .build();
        let activities = self.activities.find(None, options).await?.try_collect().await?;
        Ok(activities)
    }

    /// Delete an activity and everything that hangs off it.
    ///
    /// Refused once ballots exist, so that no ballot is ever orphaned.
    pub async fn delete(&self, id: Id) -> Result<()> {
        let registry = self.clone();
        with_transaction(&self.client, self.max_attempts, move |session| {
            let registry = registry.clone();
            async move {
                let deleted = registry
                    .activities
                    .delete_one_with_session(id.as_doc(), None, session)
                    .await?;
                if deleted.deleted_count == 0 {
                    return Err(Error::not_found(format!("Activity {id}")));
                }
                if registry.has_ballots(id, session).await? {
                    return Err(VoteError::ActivityHasBallots(id.to_hex()).into());
                }
                registry
                    .options
                    .delete_many_with_session(doc! { "activity_id": id }, None, session)
                    .await?;
                registry
                    .participations
                    .delete_many_with_session(Participation::activity_doc(id), None, session)
                    .await?;
                Ok(())
            }
            .boxed()
        })
        .await?;

        info!("Deleted activity {id}");
        Ok(())
    }

    /// Record that `identity` has voted in the activity, within the caller's
    /// transaction. Fails with [`VoteError::AlreadyVoted`] if they already have.
    pub async fn record_voted(
        &self,
        id: Id,
        identity: &str,
        session: &mut ClientSession,
    ) -> Result<()> {
        match self
            .participations
            .insert_one_with_session(Participation::new(id, identity), None, session)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key_error(&e) => Err(VoteError::AlreadyVoted.into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn has_voted(&self, id: Id, identity: &str) -> Result<bool> {
        let found = self
            .participations
            .find_one(Participation::key_doc(id, identity), None)
            .await?;
        Ok(found.is_some())
    }

    pub async fn has_voted_with_session(
        &self,
        id: Id,
        identity: &str,
        session: &mut ClientSession,
    ) -> Result<bool> {
        let found = self
            .participations
            .find_one_with_session(Participation::key_doc(id, identity), None, session)
            .await?;
        Ok(found.is_some())
    }

    /// Size of the activity's voted set.
    pub async fn voted_count_with_session(
        &self,
        id: Id,
        session: &mut ClientSession,
    ) -> Result<u64> {
        let count = self
            .participations
            .count_documents_with_session(Participation::activity_doc(id), None, session)
            .await?;
        Ok(count)
    }

    pub async fn find_with_session(
        &self,
        id: Id,
        session: &mut ClientSession,
    ) -> Result<Option<Activity>> {
        let activity = self
            .activities
            .find_one_with_session(id.as_doc(), None, session)
            .await?;
        Ok(activity)
    }

    async fn has_ballots(&self, id: Id, session: &mut ClientSession) -> Result<bool> {
        let ballot = self
            .ballots
            .find_one_with_session(doc! { "activity_id": id }, None, session)
            .await?;
        Ok(ballot.is_some())
    }

    pub fn client(&self) -> &MongoClient {
        &self.client
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Sort by `_id`, which follows insertion order for generated IDs.
pub(crate) fn creation_order() -> FindOptions {
    FindOptions::builder().sort(doc! { "_id": 1 }).build()
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ActivityRegistry {
    type Error = ();

    /// Build the registry from managed state.
    ///
    /// Panics iff the database or config is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let client = req.guard::<&State<MongoClient>>().await.unwrap();
        let db = req.guard::<&State<Database>>().await.unwrap();
        let config = req.guard::<&State<Config>>().await.unwrap();
        request::Outcome::Success(Self::new(client, db, config.commit_attempts()))
    }
}
