use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::{
    activity::Activity,
    ballot::{Ballot, Participation},
    roster::StoredRoster,
    vote_option::VoteOption,
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

const ACTIVITIES: &str = "activities";
impl MongoCollection for Activity {
    const NAME: &'static str = ACTIVITIES;
}

const OPTIONS: &str = "options";
impl MongoCollection for VoteOption {
    const NAME: &'static str = OPTIONS;
}

// Ballots and participations live apart and share no key.
const BALLOTS: &str = "ballots";
impl MongoCollection for Ballot {
    const NAME: &'static str = BALLOTS;
}

const PARTICIPATIONS: &str = "participations";
impl MongoCollection for Participation {
    const NAME: &'static str = PARTICIPATIONS;
}

const ROSTERS: &str = "rosters";
impl MongoCollection for StoredRoster {
    const NAME: &'static str = ROSTERS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    // Options are always looked up by their owning activity.
    let option_index = IndexModel::builder()
        .keys(doc! {"activity_id": 1})
        .build();
    Coll::<VoteOption>::from_db(db)
        .create_index(option_index, None)
        .await?;

    // Tallying and delete guards scan ballots per activity.
    let ballot_index = IndexModel::builder()
        .keys(doc! {"activity_id": 1})
        .build();
    Coll::<Ballot>::from_db(db)
        .create_index(ballot_index, None)
        .await?;

    // Participations are keyed by `{activity_id, student_id}` in `_id`,
    // which is unique without further help. This index serves counts.
    let participation_index = IndexModel::builder()
        .keys(doc! {"_id.activity_id": 1})
        .build();
    Coll::<Participation>::from_db(db)
        .create_index(participation_index, None)
        .await?;

    Ok(())
}
