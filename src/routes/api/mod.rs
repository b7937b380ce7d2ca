pub mod companies;
pub mod jobs;
pub mod matches;
pub mod scheduler;
pub mod scrape;
pub mod settings;

use axum::routing::{get, post, put};
use axum::Router;
use sqlx::PgPool;

use crate::orchestrator::Orchestrator;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub orchestrator: Orchestrator,
    pub scheduler: Scheduler,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        // Jobs
        .route("/jobs", get(jobs::list))
        .route("/jobs/{id}", get(jobs::get))
        .route("/jobs/{id}/status", put(jobs::set_status))
        // Companies
        .route("/companies", get(companies::list).post(companies::create))
        .route(
            "/companies/{id}",
            get(companies::get).put(companies::update),
        )
        .route("/companies/{id}/scrape", post(companies::scrape))
        // Scraping
        .route("/scrape", post(scrape::trigger))
        .route("/scrape/sessions", get(scrape::sessions))
        .route("/scrape/sessions/{id}", get(scrape::session))
        .route("/scrape/sessions/{id}/stop", post(scrape::stop))
        .route("/scrapers", get(scrape::platforms))
        // Matching
        .route("/matches", post(matches::trigger))
        .route("/matches/sessions", get(matches::sessions))
        .route("/matches/sessions/{id}", get(matches::session))
        // Scheduler
        .route("/scheduler", get(scheduler::status))
        .route("/scheduler/start", post(scheduler::start))
        .route("/scheduler/stop", post(scheduler::stop))
        .route("/scheduler/restart", post(scheduler::restart))
        // Settings
        .route("/settings", get(settings::list))
        .route("/settings/{key}", put(settings::update))
        .with_state(state);

    Router::new().nest("/api/v1", api)
}
