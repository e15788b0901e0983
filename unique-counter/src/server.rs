use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use crate::aggregator::WindowAggregator;
use crate::config::Config;
use crate::notifier::HttpNotifier;
use crate::publisher::{KafkaPublisher, PrintPublisher, Publisher};
use crate::router;
use crate::store::RedisStore;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = Arc::new(
        RedisStore::new(
            config.redis_url.clone(),
            config.redis_key.clone(),
            config.redis_timeout_ms.0,
        )
        .context("invalid REDIS_URL")?,
    );

    let notifier = Arc::new(
        HttpNotifier::new(config.notify_timeout_ms.0).context("failed to create http notifier")?,
    );

    let (publisher, kafka): (Arc<dyn Publisher + Send + Sync>, Option<KafkaPublisher>) =
        if config.print_sink {
            (Arc::new(PrintPublisher {}), None)
        } else {
            let kafka = KafkaPublisher::new(config.kafka.clone())
                .context("invalid kafka producer configuration")?;
            (Arc::new(kafka.clone()), Some(kafka))
        };

    let aggregator = WindowAggregator::new(
        store.clone(),
        publisher,
        Arc::new(crate::time::SystemTime {}),
        config.window_interval_ms.0,
    );
    let rotation = tokio::spawn(async move { aggregator.run().await });

    let app = router::router(store, notifier, config.export_prometheus);

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("listening on {}", addr);
    }
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!("http server stopped: {}", err);
    }

    rotation.abort();
    if let Some(kafka) = kafka {
        if let Err(err) = kafka.flush() {
            tracing::error!("failed to flush kafka producer: {}", err);
        }
    }
    tracing::info!("shutdown complete");
    Ok(())
}
