#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

pub use config::Config;
use config::{ConfigFairing, DatabaseFairing, EligibilityFairing};
use logging::LoggerFairing;

/// Assemble the server. Fairings run in attachment order, and the roster
/// can only be loaded once the database is online.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .register("/", catchers![error::default_catcher])
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(EligibilityFairing)
}

/// Connect to the database configured for tests.
#[cfg(test)]
async fn db_client() -> mongodb::Client {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .unwrap();
    mongodb::Client::with_uri_str(db_uri).await.unwrap()
}

/// A fresh database name, so that tests never share state.
#[cfg(test)]
fn database() -> String {
    let random: u32 = rand::random();
    format!("voting_test{random}")
}

/// The server wired to an existing client and database rather than the
/// configured ones.
#[cfg(test)]
fn rocket_for_db(db_client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    let db = db_client.database(db_name);
    rocket::build()
        .mount("/", api::routes())
        .register("/", catchers![error::default_catcher])
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .manage(db_client)
        .manage(db)
        .attach(EligibilityFairing)
}

/// A session cookie for `id`, as the external login flow would issue it.
#[cfg(test)]
fn session_cookie<U: model::auth::User>(
    client: &rocket::local::asynchronous::Client,
    id: &str,
) -> rocket::http::Cookie<'static> {
    let config = client.rocket().state::<Config>().unwrap();
    model::auth::AuthToken::<U>::new(id)
        .into_cookie(config)
        .unwrap()
}
