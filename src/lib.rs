//! glimpse-sw - offline caching engine for the Glimpse media viewer.
//!
//! The engine intercepts requests issued by Glimpse pages and answers each
//! with one of four caching strategies, chosen from the request path:
//!
//! | Request | Strategy |
//! |---|---|
//! | themed page shells (`/`, `/plex/`, ...) | network-first |
//! | generated JSON under `/data/` | always-fresh |
//! | generated artwork under `/data/` | stale-while-revalidate |
//! | everything else | cache-first |
//!
//! Cache storage and the network are traits, so the same [`ServiceWorker`]
//! runs behind the bundled HTTP proxy (feature `proxy`) or any other host.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use glimpse_sw::{FetchOutcome, FetchRequest, MemoryStorage, ReqwestNetwork, ServiceWorker, WorkerConfig};
//!
//! # async fn example() -> glimpse_sw::Result<()> {
//! let origin = reqwest::Url::parse("http://localhost:8787").unwrap();
//! let network = Arc::new(ReqwestNetwork::new(reqwest::Client::new()));
//! let worker = ServiceWorker::new(&WorkerConfig::default(), origin.clone(), Arc::new(MemoryStorage::new()), network)?;
//!
//! worker.start().await?;
//!
//! let request = FetchRequest::get(origin.join("/data/plex/movies.json").unwrap());
//! if let FetchOutcome::Responded { response, strategy } = worker.fetch(request).await? {
//!     println!("{strategy}: {}", response.status);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod classify;
pub mod config;
pub mod error;
pub mod fetch;
pub mod lifecycle;
pub mod message;
pub mod network;
pub mod offline;
#[cfg(feature = "proxy")]
pub mod proxy;
pub mod router;
pub mod stats;
pub mod storage;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use classify::{Classifier, RequestClass};
pub use config::{AppConfig, CacheConfig, PrecacheConfig, RouteConfig, WorkerConfig};
pub use error::{Error, Result};
pub use fetch::{CacheKey, FetchRequest, ResponseSnapshot};
pub use lifecycle::{ActivationReport, InstallReport, LifecycleManager};
pub use message::{Ack, ControlMessage, MessageEvent};
pub use network::{Network, ReqwestNetwork};
pub use router::{FetchOutcome, FetchRouter, Route};
pub use stats::{StatsSnapshot, WorkerStats};
pub use storage::{CacheEntry, CacheStorage, DiskStorage, MemoryStorage};
pub use strategy::Strategy;
pub use worker::{EventOutcome, ServiceWorker, WorkerEvent, WorkerState};
