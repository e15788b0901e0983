#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;

use unique_counter::aggregator::WindowAggregator;
use unique_counter::notifier::HttpNotifier;
use unique_counter::publisher::{AggregatedMessage, PublishError, Publisher};
use unique_counter::router::router;
use unique_counter::store::MemoryStore;
use unique_counter::time::TimeSource;

static TRACING_INIT: Once = Once::new();
pub fn setup_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_writer(tracing_subscriber::fmt::TestWriter::new())
            .init()
    });
}

#[derive(Clone)]
pub struct FixedTime {
    pub time: i64,
}

impl TimeSource for FixedTime {
    fn unix_seconds(&self) -> i64 {
        self.time
    }
}

#[derive(Clone, Default)]
pub struct MemoryPublisher {
    messages: Arc<Mutex<Vec<AggregatedMessage>>>,
}

impl MemoryPublisher {
    pub fn messages(&self) -> Vec<AggregatedMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, message: AggregatedMessage) -> Result<(), PublishError> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

pub struct ServerHandle {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    pub publisher: MemoryPublisher,
    pub aggregator: WindowAggregator,
    client: reqwest::Client,
}

impl ServerHandle {
    pub async fn new() -> Self {
        setup_tracing();

        let store = Arc::new(MemoryStore::new());
        let publisher = MemoryPublisher::default();
        let notifier = Arc::new(
            HttpNotifier::new(Duration::from_secs(2)).expect("failed to create notifier"),
        );

        let aggregator = WindowAggregator::new(
            store.clone(),
            Arc::new(publisher.clone()),
            Arc::new(FixedTime {
                time: 1_700_000_060,
            }),
            Duration::from_secs(60),
        );

        let app = router(store.clone(), notifier, false);
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            store,
            publisher,
            aggregator,
            client: reqwest::Client::new(),
        }
    }

    pub async fn accept(&self, query: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .get(format!("http://{}/accept", self.addr))
            .query(query)
            .send()
            .await
            .expect("failed to send accept request")
    }
}
