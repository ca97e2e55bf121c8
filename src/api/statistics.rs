use rocket::{serde::json::Json, Route, State};

use crate::{
    error::Result,
    model::{
        auth::{Admin, AuthToken},
        mongodb::Id,
        roster::EligibilityOracle,
        tally::{Statistics, TallyEngine},
    },
};

pub fn routes() -> Vec<Route> {
    routes![activity_statistics]
}

#[get("/activities/<id>/statistics")]
async fn activity_statistics(
    _token: AuthToken<Admin>,
    id: Id,
    engine: TallyEngine,
    oracle: &State<EligibilityOracle>,
) -> Result<Json<Statistics>> {
    let statistics = engine.compute(id, &oracle.snapshot()).await?;
    Ok(Json(statistics))
}
