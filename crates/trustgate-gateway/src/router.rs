//! Axum router wiring. Routes are mounted per active role.

use axum::{
    routing::{get, post},
    Router,
};

use crate::{api, app_state::AppState, ops, transport};

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics));

    if state.store().is_some() {
        router = router
            .route("/get", get(api::scores::get_scores))
            .route("/onramp", get(api::scores::onramp).post(api::scores::onramp))
            .route("/update", post(api::scores::update));
    }
    if state.decisions().is_some() {
        router = router.route("/auth", post(api::auth::authorize));
    }
    if state.cfg().proxy.is_some() {
        router = router.route("/ws", get(transport::ws::ws_proxy));
    }
    if state.provider().is_some() {
        router = router.route("/provider/get", get(api::provider::get));
    }

    router.with_state(state)
}
