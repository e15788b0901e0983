pub mod accept;
pub mod aggregator;
pub mod api;
pub mod config;
pub mod notifier;
pub mod prometheus;
pub mod publisher;
pub mod router;
pub mod server;
pub mod store;
pub mod time;
