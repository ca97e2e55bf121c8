use chrono::Utc;
use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    model::{
        activity::{
            ActivityDescription, ActivityPatch, ActivityRegistry, ActivitySpec, ActivitySummary,
            WindowStatus,
        },
        auth::{Admin, AuthToken, Student},
        mongodb::Id,
        roster::EligibilityOracle,
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        list_activities,
        get_activity,
        create_activity,
        modify_activity,
        delete_activity,
        voter_status,
    ]
}

#[get("/activities")]
async fn list_activities(registry: ActivityRegistry) -> Result<Json<Vec<ActivitySummary>>> {
    let now = Utc::now();
    let activities = registry.list().await?;
    Ok(Json(
        activities
            .into_iter()
            .map(|activity| ActivitySummary::new(activity, now))
            .collect(),
    ))
}

#[get("/activities/<id>?<include_options>")]
async fn get_activity(
    id: Id,
    include_options: Option<bool>,
    registry: ActivityRegistry,
) -> Result<Json<ActivityDescription>> {
    let now = Utc::now();
    let description = if include_options.unwrap_or(false) {
        let (activity, options) = registry.get_with_options(id).await?;
        ActivityDescription::new(activity, now)
            .with_options(options.into_iter().map(Into::into).collect())
    } else {
        ActivityDescription::new(registry.get(id).await?, now)
    };
    Ok(Json(description))
}

#[post("/activities", data = "<spec>", format = "json")]
async fn create_activity(
    _token: AuthToken<Admin>,
    spec: Json<ActivitySpec>,
    registry: ActivityRegistry,
) -> Result<Json<ActivityDescription>> {
    let activity = registry.create(spec.0).await?;
    Ok(Json(ActivityDescription::new(activity, Utc::now())))
}

#[patch("/activities/<id>", data = "<patch>", format = "json")]
async fn modify_activity(
    _token: AuthToken<Admin>,
    id: Id,
    patch: Json<ActivityPatch>,
    registry: ActivityRegistry,
) -> Result<Json<ActivityDescription>> {
    let activity = registry.update(id, patch.0).await?;
    Ok(Json(ActivityDescription::new(activity, Utc::now())))
}

#[delete("/activities/<id>")]
async fn delete_activity(
    _token: AuthToken<Admin>,
    id: Id,
    registry: ActivityRegistry,
) -> Result<()> {
    registry.delete(id).await
}

/// Whether the caller could vote in an activity right now. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterStatus {
    pub eligible: bool,
    pub voted: bool,
    pub window: WindowStatus,
}

#[get("/activities/<id>/status")]
async fn voter_status(
    token: AuthToken<Student>,
    id: Id,
    registry: ActivityRegistry,
    oracle: &State<EligibilityOracle>,
) -> Result<Json<VoterStatus>> {
    let activity = registry.get(id).await?;
    let voted = registry.has_voted(id, &token.id).await?;
    Ok(Json(VoterStatus {
        eligible: oracle.is_eligible(&token.id),
        voted,
        window: activity.status_at(Utc::now()),
    }))
}
