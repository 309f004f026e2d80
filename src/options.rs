use crate::Consistency;

/// Configures timeouts, retry behavior, failover policy and TLS.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum total attempts per logical request, across all peers.
    pub max_attempts: usize,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub backoff_base_ms: u64,
    /// Upper bound on a single backoff delay in milliseconds.
    pub backoff_cap_ms: u64,
    /// How long an unreachable peer is skipped before it is probed again.
    pub cooldown_ms: u64,
    /// Consistency level used by [`crate::QuorumDbClient::query`].
    pub default_consistency: Consistency,
    /// Staleness bound in seconds for `Consistency::None` reads.
    pub freshness_secs: Option<u64>,
    /// Reject reads that cannot prove the freshness bound instead of serving
    /// best-effort data.
    pub freshness_strict: bool,
    /// Skip TLS certificate verification. Test clusters only.
    pub accept_invalid_certs: bool,
    /// PEM-encoded root certificate trusted in addition to the system roots.
    pub root_cert_pem: Option<Vec<u8>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_attempts: 6,
            backoff_base_ms: 100,
            backoff_cap_ms: 2_000,
            cooldown_ms: 3_000,
            default_consistency: Consistency::Weak,
            freshness_secs: None,
            freshness_strict: false,
            accept_invalid_certs: false,
            root_cert_pem: None,
        }
    }
}

/// Per-batch overrides for [`crate::QuorumDbClient::batch_with`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BatchOptions {
    /// Treat the batch as safe to retry even when it contains writes, e.g.
    /// because every statement is keyed idempotently at the application
    /// level. Without this, a write whose outcome is unknown is never
    /// re-sent.
    pub safe_to_retry: bool,
    /// Consistency level for read-only batches; ignored for writes.
    pub consistency: Option<Consistency>,
}
