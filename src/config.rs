use std::sync::Arc;

use chrono::Duration;
use log::{error, info};
use mongodb::{Client as MongoClient, Database};
use rocket::{
    data::{ByteUnit, ToByteUnit},
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    mongodb::ensure_indexes_exist,
    roster::{EligibilityOracle, RosterCache},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_auth_ttl")]
    auth_ttl: u32,
    #[serde(default = "default_roster_limit")]
    roster_limit: ByteUnit,
    #[serde(default = "default_commit_attempts")]
    commit_attempts: u32,
    // secrets
    jwt_secret: String,
}

fn default_auth_ttl() -> u32 {
    3600
}

fn default_roster_limit() -> ByteUnit {
    4.mebibytes()
}

fn default_commit_attempts() -> u32 {
    8
}

impl Config {
    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key shared with the login service, used to verify JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Largest roster upload accepted.
    pub fn roster_limit(&self) -> ByteUnit {
        self.roster_limit
    }

    /// How many times a conflicting transaction is attempted before giving up.
    pub fn commit_attempts(&self) -> u32 {
        self.commit_attempts.max(1)
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: String,
}

fn default_db_name() -> String {
    "voting".to_string()
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name(config.db_name));

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to connect to database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name(configured: String) -> String {
    configured
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name(configured: String) -> String {
    let random: u32 = rand::random();
    let db = format!("{configured}_test{random}");
    info!("Using database {db}");
    db
}

/// A fairing that loads the persisted roster generations into a fresh
/// cache and places the resulting [`EligibilityOracle`] into managed state.
///
/// Must be attached after [`DatabaseFairing`].
pub struct EligibilityFairing;

#[rocket::async_trait]
impl Fairing for EligibilityFairing {
    fn info(&self) -> Info {
        Info {
            name: "Eligibility roster",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let (client, db) = match (rocket.state::<MongoClient>(), rocket.state::<Database>()) {
            (Some(client), Some(db)) => (client.clone(), db.clone()),
            _ => {
                error!("Eligibility roster requires the database fairing");
                return Err(rocket);
            }
        };
        let attempts = match rocket.state::<Config>() {
            Some(config) => config.commit_attempts(),
            None => default_commit_attempts(),
        };

        let cache = Arc::new(RosterCache::new());
        let oracle = EligibilityOracle::new(cache, &client, &db, attempts);
        match oracle.load().await {
            Ok(stats) => info!(
                "Loaded eligibility roster: {} identities, backup present: {}",
                stats.total, stats.has_backup
            ),
            Err(e) => {
                error!("Failed to load eligibility roster: {e}");
                return Err(rocket);
            }
        }

        Ok(rocket.manage(oracle))
    }
}
