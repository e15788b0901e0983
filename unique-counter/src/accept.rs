use axum::extract::{Query, State};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use crate::api::{AcceptError, ACCEPTED_BODY};
use crate::notifier::{ForwardMethod, ForwardTarget};
use crate::prometheus::report_notification;
use crate::router;
use crate::store::MarkOutcome;

#[derive(Deserialize, Default, Debug)]
pub struct AcceptQuery {
    pub id: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
}

impl AcceptQuery {
    /// The downstream target, if a non-empty endpoint was supplied.
    pub fn forward_target(&self) -> Option<ForwardTarget> {
        let endpoint = self.endpoint.as_deref().filter(|e| !e.is_empty())?;

        let method = match self.method.as_deref() {
            None | Some("") => ForwardMethod::default(),
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("unsupported forward method {}, using GET", raw);
                ForwardMethod::GET
            }),
        };

        Some(ForwardTarget {
            endpoint: endpoint.to_owned(),
            method,
        })
    }
}

#[instrument(skip_all, fields(id))]
pub async fn accept(
    state: State<router::State>,
    meta: Query<AcceptQuery>,
) -> Result<&'static str, AcceptError> {
    let id = match meta.id.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => return Err(AcceptError::MissingId),
    };
    tracing::Span::current().record("id", id);

    match state.store.try_mark(id).await {
        MarkOutcome::First => info!("new unique request: {}", id),
        // A store failure is logged by the store and reported like a duplicate
        MarkOutcome::Duplicate | MarkOutcome::Unavailable => info!("duplicate request: {}", id),
    }

    // Forwarding is independent of the dedup outcome
    if let Some(target) = meta.forward_target() {
        forward(&state, &target).await;
    }

    Ok(ACCEPTED_BODY)
}

async fn forward(state: &router::State, target: &ForwardTarget) {
    let count = match state.store.cardinality().await {
        Ok(count) => count,
        Err(err) => {
            error!("failed to get unique request count: {}", err);
            report_notification("skipped");
            return;
        }
    };

    match state.notifier.notify(target, count).await {
        Ok(status) => {
            info!(
                "sent {} request to {}, status {}",
                target.method,
                target.endpoint,
                status.as_u16()
            );
            report_notification("sent");
        }
        Err(err) => {
            error!("{}", err);
            report_notification("failed");
        }
    }
}
