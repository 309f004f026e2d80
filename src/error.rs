/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum QuorumDbError {
    /// No cluster node could serve the request within the retry budget, or a
    /// non-idempotent request failed after its outcome became ambiguous.
    #[error("cluster unavailable after {attempts} attempt(s): {last_error}")]
    ClusterUnavailable {
        /// Attempts made before giving up.
        attempts: usize,
        /// Description of the last failure observed.
        last_error: String,
    },
    /// The store rejected a statement. Terminal; carries the store's message
    /// verbatim and the index of the failing statement within the request.
    #[error("statement {index} failed: {message}")]
    Sql {
        /// Position of the failing statement in the submitted batch.
        index: usize,
        /// Error message text from the store.
        message: String,
    },
    /// Response shape violated the protocol (unparseable body, duplicate
    /// column names, row arity mismatch). Distinct from a SQL error.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Non-success HTTP status that is neither retryable nor leader-related.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// Network or request execution error from `reqwest`, outside the
    /// dispatcher's retry loop.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// A non-retryable attempt exceeded its per-attempt timeout.
    #[error("request timed out")]
    Timeout,
    /// The caller's cancellation token fired before the request completed.
    #[error("request cancelled")]
    Cancelled,
    /// Invalid client configuration (seed list, credentials, TLS material).
    #[error("configuration error: {0}")]
    Config(String),
    /// A statement or parameter value could not be encoded for the wire.
    #[error("encode error: {0}")]
    Encode(String),
    /// Operation on a transaction that already left the `open` state.
    #[error("transaction is {state}")]
    TransactionClosed {
        /// State the transaction was found in.
        state: &'static str,
    },
}
