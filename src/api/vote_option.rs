use rocket::{serde::json::Json, Route};

use crate::{
    error::Result,
    model::{
        auth::{Admin, AuthToken},
        mongodb::Id,
        vote_option::{OptionCatalog, OptionDescription, OptionPatch, OptionSpec},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        list_options,
        get_option,
        create_option,
        modify_option,
        delete_option,
    ]
}

#[get("/activities/<activity_id>/options")]
async fn list_options(
    activity_id: Id,
    catalog: OptionCatalog,
) -> Result<Json<Vec<OptionDescription>>> {
    let options = catalog.list_by_activity(activity_id).await?;
    Ok(Json(options.into_iter().map(Into::into).collect()))
}

#[get("/options/<id>")]
async fn get_option(id: Id, catalog: OptionCatalog) -> Result<Json<OptionDescription>> {
    Ok(Json(catalog.get(id).await?.into()))
}

#[post("/activities/<activity_id>/options", data = "<spec>", format = "json")]
async fn create_option(
    _token: AuthToken<Admin>,
    activity_id: Id,
    spec: Json<OptionSpec>,
    catalog: OptionCatalog,
) -> Result<Json<OptionDescription>> {
    let option = catalog.create(activity_id, spec.0).await?;
    Ok(Json(option.into()))
}

#[patch("/options/<id>", data = "<patch>", format = "json")]
async fn modify_option(
    _token: AuthToken<Admin>,
    id: Id,
    patch: Json<OptionPatch>,
    catalog: OptionCatalog,
) -> Result<Json<OptionDescription>> {
    let option = catalog.update(id, patch.0).await?;
    Ok(Json(option.into()))
}

#[delete("/options/<id>")]
async fn delete_option(_token: AuthToken<Admin>, id: Id, catalog: OptionCatalog) -> Result<()> {
    catalog.delete(id).await
}
