use log::info;
use mongodb::{bson::doc, Client as MongoClient, ClientSession, Database};
use rocket::{
    futures::{FutureExt, TryStreamExt},
    request::{self, FromRequest, Request},
    State,
};

use crate::config::Config;
use crate::error::{Error, Result, VoteError};
use crate::model::{
    activity::{creation_order, Activity},
    ballot::Ballot,
    mongodb::{with_transaction, Coll, Id},
};

use super::vote_option_core::{OptionPatch, OptionSpec, VoteOption};

/// The store of options, each scoped to one activity.
///
/// Creating or deleting an option keeps the owning activity's option list
/// in step, in the same transaction. Neither is allowed once the activity
/// has ballots, since cast selections refer to the option set.
#[derive(Clone)]
pub struct OptionCatalog {
    client: MongoClient,
    activities: Coll<Activity>,
    options: Coll<VoteOption>,
    ballots: Coll<Ballot>,
    max_attempts: u32,
}

impl OptionCatalog {
    pub fn new(client: &MongoClient, db: &Database, max_attempts: u32) -> Self {
        Self {
            client: client.clone(),
            activities: Coll::from_db(db),
            options: Coll::from_db(db),
            ballots: Coll::from_db(db),
            max_attempts,
        }
    }

    pub async fn create(&self, activity_id: Id, spec: OptionSpec) -> Result<VoteOption> {
        let option = spec.into_option(activity_id)?;
        let catalog = self.clone();
        let inserted = option.clone();
        with_transaction(&self.client, self.max_attempts, move |session| {
            let catalog = catalog.clone();
            let option = inserted.clone();
            async move {
                let update = doc! { "$addToSet": { "option_ids": option.id } };
                let result = catalog
                    .activities
                    .update_one_with_session(activity_id.as_doc(), update, None, session)
                    .await?;
                if result.matched_count == 0 {
                    return Err(Error::not_found(format!("Activity {activity_id}")));
                }
                catalog.refuse_if_voted(activity_id, session).await?;
                catalog
                    .options
                    .insert_one_with_session(&option, None, session)
                    .await?;
                Ok(())
            }
            .boxed()
        })
        .await?;

        info!("Created option {} for activity {activity_id}", option.id);
        Ok(option)
    }

    pub async fn update(&self, id: Id, patch: OptionPatch) -> Result<VoteOption> {
        let option = patch.apply(self.get(id).await?)?;
        let result = self.options.replace_one(id.as_doc(), &option, None).await?;
        if result.matched_count == 0 {
            return Err(Error::not_found(format!("Option {id}")));
        }
        Ok(option)
    }

    /// Delete an option and remove it from its activity.
    pub async fn delete(&self, id: Id) -> Result<()> {
        let catalog = self.clone();
        with_transaction(&self.client, self.max_attempts, move |session| {
            let catalog = catalog.clone();
            async move {
                let option = catalog
                    .options
                    .find_one_and_delete_with_session(id.as_doc(), None, session)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("Option {id}")))?;
                catalog.refuse_if_voted(option.activity_id, session).await?;
                let update = doc! { "$pull": { "option_ids": id } };
                catalog
                    .activities
                    .update_one_with_session(option.activity_id.as_doc(), update, None, session)
                    .await?;
                Ok(())
            }
            .boxed()
        })
        .await?;

        info!("Deleted option {id}");
        Ok(())
    }

    async fn refuse_if_voted(&self, activity_id: Id, session: &mut ClientSession) -> Result<()> {
        let ballot = self
            .ballots
            .find_one_with_session(doc! { "activity_id": activity_id }, None, session)
            .await?;
        match ballot {
            Some(_) => Err(VoteError::ActivityHasBallots(activity_id.to_hex()).into()),
            None => Ok(()),
        }
    }

    pub async fn get(&self, id: Id) -> Result<VoteOption> {
        self.options
            .find_one(id.as_doc(), None)
            .await?
            .ok_or_else(|| Error::not_found(format!("Option {id}")))
    }

    /// Options of an activity in creation order. Fails if the activity does not exist.
    pub async fn list_by_activity(&self, activity_id: Id) -> Result<Vec<VoteOption>> {
        if self.activities.find_one(activity_id.as_doc(), None).await?.is_none() {
            return Err(Error::not_found(format!("Activity {activity_id}")));
        }
        let options = self
            .options
            .find(doc! { "activity_id": activity_id }, creation_order())
            .await?
            .try_collect()
            .await?;
        Ok(options)
    }

    /// Options of an activity, read within the caller's transaction.
    pub async fn list_with_session(
        &self,
        activity_id: Id,
        session: &mut ClientSession,
    ) -> Result<Vec<VoteOption>> {
        let mut cursor = self
            .options
            .find_with_session(doc! { "activity_id": activity_id }, creation_order(), session)
            .await?;
        let mut options = Vec::new();
        while let Some(option) = cursor.next(session).await {
            options.push(option?);
        }
        Ok(options)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for OptionCatalog {
    type Error = ();

    /// Build the catalog from managed state.
    ///
    /// Panics iff the database or config is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let client = req.guard::<&State<MongoClient>>().await.unwrap();
        let db = req.guard::<&State<Database>>().await.unwrap();
        let config = req.guard::<&State<Config>>().await.unwrap();
        request::Outcome::Success(Self::new(client, db, config.commit_attempts()))
    }
}
