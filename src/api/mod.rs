use rocket::Route;

mod activity;
mod roster;
mod statistics;
mod vote;
mod vote_option;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(activity::routes());
    routes.extend(vote_option::routes());
    routes.extend(vote::routes());
    routes.extend(roster::routes());
    routes.extend(statistics::routes());
    routes
}
