//! `quorumdb-http` is an async, cluster-aware HTTP client for QuorumDB, a
//! leader-based distributed SQL store.
//!
//! The crate wraps the `/db/query` and `/db/execute` endpoints with
//! ergonomic methods:
//! - [`QuorumDbClient::query`]
//! - [`QuorumDbClient::execute`]
//! - [`QuorumDbClient::batch`]
//! - [`QuorumDbClient::begin`] for atomic multi-statement transactions
//!
//! Any seed node may be contacted first; the client tracks which peer is
//! believed to lead the cluster, follows not-leader redirects, retries
//! idempotent requests across peers with exponential backoff, and never
//! blindly re-sends a write whose outcome is unknown.

mod classify;
mod client;
mod cluster;
mod consistency;
mod decode;
mod error;
mod options;
mod params;
mod tx;
mod types;
mod value;
mod wire;

pub use classify::{classify, Classification, StatementKind};
pub use client::QuorumDbClient;
pub use cluster::{PeerRole, PeerStatus};
pub use consistency::Consistency;
pub use error::QuorumDbError;
pub use options::{BatchOptions, ClientOptions};
pub use params::{Params, Statement};
pub use tx::{Transaction, TxState};
pub use types::{Column, ExecOutcome, NodeInfo, ResultSet, Row, StatementOutcome};
pub use value::Value;

// Re-exported so callers can cancel in-flight requests without naming
// tokio-util themselves.
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, QuorumDbError>;
