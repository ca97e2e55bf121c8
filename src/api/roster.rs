use rocket::{data::Data, http::Status, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        auth::{Admin, AuthToken},
        roster::{EligibilityOracle, RosterCount, RosterStats},
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![roster_stats, replace_roster, rollback_roster]
}

#[get("/roster")]
async fn roster_stats(
    _token: AuthToken<Admin>,
    oracle: &State<EligibilityOracle>,
) -> Json<RosterStats> {
    Json(oracle.stats())
}

/// Replace the roster with an uploaded CSV or plain list, one identity per line.
#[put("/roster", data = "<upload>")]
async fn replace_roster(
    _token: AuthToken<Admin>,
    upload: Data<'_>,
    config: &State<Config>,
    oracle: &State<EligibilityOracle>,
) -> Result<Json<RosterCount>> {
    let content = upload
        .open(config.roster_limit())
        .into_string()
        .await
        .map_err(|e| Error::Status(Status::BadRequest, format!("Unreadable roster upload: {e}")))?;
    if !content.is_complete() {
        return Err(Error::Status(
            Status::PayloadTooLarge,
            format!("Roster upload exceeds {}", config.roster_limit()),
        ));
    }

    let count = oracle.replace(&content).await?;
    Ok(Json(count))
}

#[post("/roster/rollback")]
async fn rollback_roster(
    _token: AuthToken<Admin>,
    oracle: &State<EligibilityOracle>,
) -> Result<Json<RosterCount>> {
    Ok(Json(oracle.rollback().await?))
}
