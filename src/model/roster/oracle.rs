use std::sync::Arc;

use log::info;
use mongodb::{
    bson::{doc, Document},
    options::ReplaceOptions,
    Client as MongoClient, ClientSession, Database,
};
use rocket::{futures::FutureExt, tokio::sync::Mutex};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VoteError};
use crate::model::mongodb::{with_transaction, Coll};

use super::{
    cache::{Roster, RosterCache, RosterCount, RosterStats},
    parse::parse_roster,
};

/// Which generation a persisted roster is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RosterSlot {
    Current,
    Previous,
}

impl RosterSlot {
    fn filter(self) -> Document {
        let name = match self {
            Self::Current => "current",
            Self::Previous => "previous",
        };
        doc! { "_id": name }
    }
}

/// A roster generation as persisted, one document per slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRoster {
    #[serde(rename = "_id")]
    pub slot: RosterSlot,
    pub identities: Vec<String>,
}

/// Answers "may this identity vote?" and owns roster replacement.
///
/// Lookups only touch the injected [`RosterCache`]. Replacement and
/// rollback write the `rosters` collection first and update the cache only
/// once that has committed.
pub struct EligibilityOracle {
    cache: Arc<RosterCache>,
    client: MongoClient,
    rosters: Coll<StoredRoster>,
    max_attempts: u32,
    writer: Mutex<()>,
}

impl EligibilityOracle {
    pub fn new(cache: Arc<RosterCache>, client: &MongoClient, db: &Database, max_attempts: u32) -> Self {
        Self {
            cache,
            client: client.clone(),
            rosters: Coll::from_db(db),
            max_attempts,
            writer: Mutex::new(()),
        }
    }

    /// Fill the cache from the persisted generations.
    pub async fn load(&self) -> Result<RosterStats> {
        let _writer = self.writer.lock().await;
        let current = self.rosters.find_one(RosterSlot::Current.filter(), None).await?;
        let previous = self.rosters.find_one(RosterSlot::Previous.filter(), None).await?;
        self.cache.restore(
            current.map(|r| Roster::new(r.identities)).unwrap_or_default(),
            previous.map(|r| Roster::new(r.identities)),
        );
        Ok(self.cache.stats())
    }

    pub fn is_eligible(&self, identity: &str) -> bool {
        self.cache.is_eligible(identity)
    }

    /// The current generation, for callers that need several consistent lookups.
    pub fn snapshot(&self) -> Arc<Roster> {
        self.cache.current()
    }

    pub fn stats(&self) -> RosterStats {
        self.cache.stats()
    }

    /// Parse `content` and install it as the current roster, keeping the
    /// old one as the backup.
    pub async fn replace(&self, content: &str) -> Result<RosterCount> {
        let identities = parse_roster(content)?;

        let _writer = self.writer.lock().await;
        let rosters = self.rosters.clone();
        let stored = identities.clone();
        with_transaction(&self.client, self.max_attempts, move |session| {
            let rosters = rosters.clone();
            let stored = stored.clone();
            async move {
                let old = rosters
                    .find_one_with_session(RosterSlot::Current.filter(), None, session)
                    .await?;
                match old {
                    Some(old) => put(&rosters, RosterSlot::Previous, old.identities, session).await?,
                    None => {
                        rosters
                            .delete_one_with_session(RosterSlot::Previous.filter(), None, session)
                            .await?;
                    }
                }
                put(&rosters, RosterSlot::Current, stored, session).await
            }
            .boxed()
        })
        .await?;

        let count = self.cache.replace(Roster::new(identities));
        info!("Replaced eligibility roster, {} identities", count.count);
        Ok(count)
    }

    /// Reinstate the backup roster. The backup is consumed.
    pub async fn rollback(&self) -> Result<RosterCount> {
        let _writer = self.writer.lock().await;
        if !self.cache.has_backup() {
            return Err(VoteError::NoBackup.into());
        }

        let rosters = self.rosters.clone();
        with_transaction(&self.client, self.max_attempts, move |session| {
            let rosters = rosters.clone();
            async move {
                let previous = rosters
                    .find_one_and_delete_with_session(RosterSlot::Previous.filter(), None, session)
                    .await?
                    .ok_or(VoteError::NoBackup)?;
                put(&rosters, RosterSlot::Current, previous.identities, session).await
            }
            .boxed()
        })
        .await?;

        let count = self.cache.rollback()?;
        info!("Rolled eligibility roster back, {} identities", count.count);
        Ok(count)
    }
}

async fn put(
    rosters: &Coll<StoredRoster>,
    slot: RosterSlot,
    identities: Vec<String>,
    session: &mut ClientSession,
) -> Result<()> {
    let upsert = ReplaceOptions::builder().upsert(true).build();
    rosters
        .replace_one_with_session(
            slot.filter(),
            &StoredRoster { slot, identities },
            upsert,
            session,
        )
        .await?;
    Ok(())
}
