//! # logpipe-ingest
//!
//! Storage-side service of the platform log pipeline.
//!
//! Producers post batches to `/ingest`; events are stamped with their
//! ingestion time, grouped by resource under the UTC day they arrived,
//! appended to the archive, and fanned out to live subscribers.
//!
//! ## Example
//!
//! ```rust,no_run
//! use logpipe_ingest::{IngestConfig, IngestServer};
//!
//! # async fn run() -> logpipe_ingest::IngestResult<()> {
//! let config = IngestConfig::from_file("ingest.toml")?;
//! let server = IngestServer::open(config.clone())?;
//! server
//!     .serve_with_shutdown(config.bind_addr, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/ingest` | POST | Store a batch `{"events": [...]}` |
//! | `/query` | GET | Page through a resource's events, newest first |
//! | `/stream` | GET | Server-sent events of newly stored events |
//! | `/health` | GET | Liveness and uptime |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod retention;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use config::{IngestConfig, LogFormat, QuerySettings, RetentionSettings, StorageSettings};
pub use error::{IngestError, IngestResult};
pub use handlers::{API_KEY_HEADER, IngestResponse, STREAM_EVENT_NAME};
pub use retention::{MIN_SWEEP_INTERVAL, RetentionSweeper, SweepReport};
pub use routes::create_router;
pub use server::IngestServer;
pub use state::IngestState;
