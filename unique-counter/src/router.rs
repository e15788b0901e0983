use std::future::ready;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::accept;
use crate::notifier::Notifier;
use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::store::DedupStore;

#[derive(Clone)]
pub struct State {
    pub store: Arc<dyn DedupStore + Send + Sync>,
    pub notifier: Arc<dyn Notifier + Send + Sync>,
}

async fn index() -> &'static str {
    "unique-counter"
}

pub fn router(
    store: Arc<dyn DedupStore + Send + Sync>,
    notifier: Arc<dyn Notifier + Send + Sync>,
    metrics: bool,
) -> Router {
    let state = State { store, notifier };

    let router = Router::new()
        .route("/", get(index))
        .route("/accept", get(accept::accept))
        .route("/api/verve/accept", get(accept::accept))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when used as a library (during tests etc)
    // does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();

        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
