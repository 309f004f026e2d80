use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::{header, redirect};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    classify::classify,
    cluster::{NodeDirectory, PeerStatus, RoleHint},
    decode::{decode_exec_outcome, decode_result_set},
    wire::{self, Disposition, Envelope},
    BatchOptions, ClientOptions, Consistency, ExecOutcome, NodeInfo, Params, PeerRole,
    QuorumDbError, Result, ResultSet, Statement, StatementOutcome, Transaction,
};

#[derive(Clone)]
enum Auth {
    None,
    Basic { user: String, password: String },
    Bearer(String),
}

/// Where one request goes: the query endpoint with a consistency level, or
/// the execute endpoint, optionally as one atomic unit.
#[derive(Clone, Copy, Debug)]
enum Route {
    Query(Consistency),
    Execute { atomic: bool },
}

/// Cluster-aware HTTP client for QuorumDB.
///
/// Tracks known peers and the believed leader, routes reads by consistency
/// level and writes to the leader, and fails over across peers with
/// exponential backoff. Cloning is cheap and clones share the same node
/// directory and connection pool.
#[derive(Clone)]
pub struct QuorumDbClient {
    http: reqwest::Client,
    directory: Arc<NodeDirectory>,
    auth: Auth,
    options: ClientOptions,
}

impl fmt::Debug for QuorumDbClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuorumDbClient")
            .field("peers", &self.directory.peers())
            .field("auth", &"<redacted>")
            .field("options", &self.options)
            .finish()
    }
}

impl QuorumDbClient {
    /// Creates a client from one or more seed node URLs.
    ///
    /// Addresses without a scheme default to `http://`. The seed order is
    /// the initial round-robin order.
    pub fn new<I, S>(seed_urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let options = ClientOptions::default();
        let seeds: Vec<String> = seed_urls
            .into_iter()
            .map(|url| normalize_base_url(&url.into()))
            .collect();
        if seeds.is_empty() {
            return Err(QuorumDbError::Config("no seed node addresses".to_owned()));
        }
        Ok(Self {
            http: build_http(&options)?,
            directory: Arc::new(NodeDirectory::new(
                seeds,
                Duration::from_millis(options.cooldown_ms),
            )),
            auth: Auth::None,
            options,
        })
    }

    /// Creates a client from environment variables.
    ///
    /// Reads `QUORUMDB_URLS` (comma-separated seed addresses) plus either
    /// `QUORUMDB_USER`/`QUORUMDB_PASSWORD` or `QUORUMDB_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let urls = std::env::var("QUORUMDB_URLS")
            .map_err(|_| QuorumDbError::Config("missing QUORUMDB_URLS".to_owned()))?;
        let seeds: Vec<&str> = urls
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if seeds.is_empty() {
            return Err(QuorumDbError::Config("QUORUMDB_URLS is empty".to_owned()));
        }
        let client = Self::new(seeds)?;
        if let (Ok(user), Ok(password)) = (
            std::env::var("QUORUMDB_USER"),
            std::env::var("QUORUMDB_PASSWORD"),
        ) {
            return Ok(client.with_basic_auth(user, password));
        }
        if let Ok(token) = std::env::var("QUORUMDB_TOKEN") {
            return Ok(client.with_bearer(token));
        }
        Ok(client)
    }

    /// Attaches HTTP basic credentials to every request.
    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Auth::Basic {
            user: user.into(),
            password: password.into(),
        };
        self
    }

    /// Attaches a bearer token to every request.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added.
    pub fn with_bearer(mut self, token: impl AsRef<str>) -> Self {
        self.auth = Auth::Bearer(normalize_bearer_authorization(token.as_ref()));
        self
    }

    /// Applies client options, rebuilding the HTTP client (for the TLS
    /// settings) and the peer cooldown policy. Known peers are kept.
    pub fn with_options(self, options: ClientOptions) -> Result<Self> {
        let seeds: Vec<String> = self
            .directory
            .peers()
            .into_iter()
            .map(|peer| peer.base_url)
            .collect();
        Ok(Self {
            http: build_http(&options)?,
            directory: Arc::new(NodeDirectory::new(
                seeds,
                Duration::from_millis(options.cooldown_ms),
            )),
            auth: self.auth,
            options,
        })
    }

    /// Executes one read statement at the default consistency level.
    pub async fn query<P: Into<Params>>(&self, sql: &str, params: P) -> Result<ResultSet> {
        self.query_with(
            sql,
            params,
            self.options.default_consistency,
            &CancellationToken::new(),
        )
        .await
    }

    /// Executes one read statement at an explicit consistency level.
    pub async fn query_at<P: Into<Params>>(
        &self,
        sql: &str,
        params: P,
        level: Consistency,
    ) -> Result<ResultSet> {
        self.query_with(sql, params, level, &CancellationToken::new())
            .await
    }

    /// [`QuorumDbClient::query_at`] with caller-supplied cancellation.
    pub async fn query_with<P: Into<Params>>(
        &self,
        sql: &str,
        params: P,
        level: Consistency,
        cancel: &CancellationToken,
    ) -> Result<ResultSet> {
        let statements = [Statement::new(sql, params)];
        let envelope = self.run(&statements, level, false, cancel).await?;
        let mut result = single_result(envelope)?;
        if let Some(message) = result.error.take() {
            return Err(QuorumDbError::Sql { index: 0, message });
        }
        decode_result_set(result)
    }

    /// Executes one write/DDL statement and returns its metadata.
    pub async fn execute<P: Into<Params>>(&self, sql: &str, params: P) -> Result<ExecOutcome> {
        self.execute_with(sql, params, &CancellationToken::new())
            .await
    }

    /// [`QuorumDbClient::execute`] with caller-supplied cancellation.
    pub async fn execute_with<P: Into<Params>>(
        &self,
        sql: &str,
        params: P,
        cancel: &CancellationToken,
    ) -> Result<ExecOutcome> {
        let statements = [Statement::new(sql, params)];
        let envelope = self
            .run(&statements, self.options.default_consistency, false, cancel)
            .await?;
        let mut result = single_result(envelope)?;
        if let Some(message) = result.error.take() {
            return Err(QuorumDbError::Sql { index: 0, message });
        }
        Ok(decode_exec_outcome(result))
    }

    /// Sends several independent statements in one request.
    ///
    /// Statement-level SQL failures do not fail the batch: each outcome is
    /// reported positionally, [`StatementOutcome::SqlError`] marking exactly
    /// which member the store rejected.
    pub async fn batch<I>(&self, statements: I) -> Result<Vec<StatementOutcome>>
    where
        I: IntoIterator<Item = Statement>,
    {
        self.batch_with(
            statements,
            BatchOptions::default(),
            &CancellationToken::new(),
        )
        .await
    }

    /// [`QuorumDbClient::batch`] with per-batch options and cancellation.
    pub async fn batch_with<I>(
        &self,
        statements: I,
        options: BatchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<StatementOutcome>>
    where
        I: IntoIterator<Item = Statement>,
    {
        let statements: Vec<Statement> = statements.into_iter().collect();
        if statements.is_empty() {
            return Ok(Vec::new());
        }
        let level = options
            .consistency
            .unwrap_or(self.options.default_consistency);
        let envelope = self
            .run(&statements, level, options.safe_to_retry, cancel)
            .await?;

        if envelope.results.len() != statements.len() {
            return Err(QuorumDbError::Protocol(format!(
                "result count mismatch: expected {}, got {}",
                statements.len(),
                envelope.results.len()
            )));
        }

        let mut outcomes = Vec::with_capacity(envelope.results.len());
        for (index, mut result) in envelope.results.into_iter().enumerate() {
            if let Some(message) = result.error.take() {
                outcomes.push(StatementOutcome::SqlError { index, message });
            } else if result.columns.is_some() {
                outcomes.push(StatementOutcome::Rows(decode_result_set(result)?));
            } else {
                outcomes.push(StatementOutcome::Exec(decode_exec_outcome(result)));
            }
        }
        Ok(outcomes)
    }

    /// Opens a client-side transaction. Statements buffer locally and are
    /// submitted as one atomic batch on commit.
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Fetches cluster membership from the discovery endpoint and absorbs
    /// it into the node directory.
    pub async fn nodes(&self) -> Result<Vec<NodeInfo>> {
        let body = self.get_diagnostic("/nodes").await?;
        let parsed: wire::NodesResponse = serde_json::from_str(&body)
            .map_err(|err| QuorumDbError::Protocol(format!("invalid nodes response: {err}")))?;

        let mut nodes = Vec::with_capacity(parsed.len());
        for (id, entry) in parsed {
            let Some(api_addr) = entry.api_addr else {
                continue;
            };
            nodes.push(NodeInfo {
                id,
                api_addr: normalize_base_url(&api_addr),
                role: if entry.leader {
                    PeerRole::Leader
                } else {
                    PeerRole::Follower
                },
                reachable: entry.reachable,
            });
        }

        let membership: Vec<(String, PeerRole, bool)> = nodes
            .iter()
            .map(|node| (node.api_addr.clone(), node.role, node.reachable))
            .collect();
        self.directory.absorb_nodes(&membership);
        Ok(nodes)
    }

    /// Fetches the status document of whichever node answers.
    pub async fn status(&self) -> Result<serde_json::Value> {
        let body = self.get_diagnostic("/status").await?;
        serde_json::from_str(&body)
            .map_err(|err| QuorumDbError::Protocol(format!("invalid status response: {err}")))
    }

    /// Readiness probe of whichever node answers.
    pub async fn ready(&self) -> Result<String> {
        self.get_diagnostic("/readyz").await
    }

    /// Base URL of the believed leader, if one is known.
    pub fn leader(&self) -> Option<String> {
        self.directory.leader()
    }

    /// Snapshot of every known peer and its believed role.
    pub fn peers(&self) -> Vec<PeerStatus> {
        self.directory.peers()
    }

    /// Submits a transaction's batch as one atomic write request.
    pub(crate) async fn execute_atomic(
        &self,
        statements: &[Statement],
        cancel: &CancellationToken,
    ) -> Result<Envelope> {
        let body = wire::encode_statements(statements)?;
        self.dispatch(&body, Route::Execute { atomic: true }, false, cancel)
            .await
    }

    /// Classifies a batch and routes it: reads to the query endpoint at the
    /// requested level, anything containing a write to the execute endpoint.
    async fn run(
        &self,
        statements: &[Statement],
        level: Consistency,
        safe_to_retry: bool,
        cancel: &CancellationToken,
    ) -> Result<Envelope> {
        let classification = classify(statements);
        let route = if classification.is_write() {
            Route::Execute { atomic: false }
        } else {
            Route::Query(level)
        };
        let idempotent = classification.idempotent || safe_to_retry;
        let body = wire::encode_statements(statements)?;
        self.dispatch(&body, route, idempotent, cancel).await
    }

    /// One logical request against the cluster: pick a target, send, map
    /// the response, fail over and back off until success, a terminal
    /// failure, cancellation or an exhausted attempt budget.
    async fn dispatch(
        &self,
        body: &serde_json::Value,
        route: Route,
        idempotent: bool,
        cancel: &CancellationToken,
    ) -> Result<Envelope> {
        let is_write = matches!(route, Route::Execute { .. });
        let mut attempt = 0usize;
        let mut last_error = String::new();

        loop {
            if cancel.is_cancelled() {
                return Err(QuorumDbError::Cancelled);
            }

            let target = match self.directory.acquire_target() {
                Ok(target) => target,
                Err(QuorumDbError::ClusterUnavailable {
                    last_error: directory_error,
                    ..
                }) => {
                    return Err(QuorumDbError::ClusterUnavailable {
                        attempts: attempt,
                        last_error: if last_error.is_empty() {
                            directory_error
                        } else {
                            last_error
                        },
                    });
                }
                Err(err) => return Err(err),
            };

            let url = self.route_url(&target, route);
            tracing::debug!(%url, attempt, idempotent, "dispatching request");

            let request = self
                .apply_auth(self.http.post(&url))
                .header(header::CONTENT_TYPE, "application/json")
                .timeout(Duration::from_millis(self.options.timeout_ms))
                .json(body);

            let send = async {
                let response = request.send().await?;
                let status = response.status().as_u16();
                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned);
                let text = response.text().await?;
                Ok::<_, reqwest::Error>((status, location, text))
            };
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(QuorumDbError::Cancelled),
                outcome = send => outcome,
            };

            match outcome {
                Ok((status, location, text)) => {
                    match wire::map_response(status, location.as_deref(), &text) {
                        Disposition::Success { envelope, role } => {
                            // A served write proves leadership even when the
                            // response carried no role metadata.
                            let role = match role {
                                RoleHint::Unchanged if is_write => RoleHint::Leader,
                                other => other,
                            };
                            self.directory.record_success(&target, role);
                            return Ok(envelope);
                        }
                        Disposition::NotLeader { redirect } => {
                            tracing::debug!(peer = %target, "not the leader, failing over");
                            self.directory.record_not_leader(&target, redirect);
                            last_error = format!("{target} is not the leader");
                        }
                        Disposition::Retryable { status, body } => {
                            self.directory.record_failure(&target);
                            if !idempotent {
                                // The store produced a response, so it may
                                // have attempted execution. Re-sending could
                                // double-apply the write; surface instead.
                                return Err(QuorumDbError::Http { status, body });
                            }
                            tracing::warn!(peer = %target, status, "retryable response");
                            last_error = format!("{target} answered http {status}");
                        }
                        Disposition::Terminal(err) => return Err(err),
                    }
                }
                Err(err) => {
                    self.directory.record_failure(&target);
                    if !idempotent && !err.is_connect() {
                        // Past connection setup the request body may have
                        // been received; the outcome is unknowable here.
                        if err.is_timeout() {
                            return Err(QuorumDbError::Timeout);
                        }
                        return Err(QuorumDbError::ClusterUnavailable {
                            attempts: attempt + 1,
                            last_error: err.to_string(),
                        });
                    }
                    tracing::warn!(peer = %target, error = %err, "transport failure");
                    last_error = err.to_string();
                }
            }

            attempt += 1;
            if attempt >= self.options.max_attempts {
                return Err(QuorumDbError::ClusterUnavailable {
                    attempts: attempt,
                    last_error,
                });
            }
            self.wait_before_retry(attempt - 1, cancel).await?;
        }
    }

    fn route_url(&self, base: &str, route: Route) -> String {
        match route {
            Route::Query(level) => {
                let mut url = format!("{base}/db/query?level={}", level.as_param());
                if level == Consistency::None {
                    if let Some(secs) = self.options.freshness_secs {
                        url.push_str(&format!("&freshness={secs}s"));
                        if self.options.freshness_strict {
                            url.push_str("&freshness_strict");
                        }
                    }
                }
                url
            }
            Route::Execute { atomic: true } => format!("{base}/db/execute?transaction"),
            Route::Execute { atomic: false } => format!("{base}/db/execute"),
        }
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Auth::None => request,
            Auth::Basic { user, password } => request.basic_auth(user, Some(password)),
            Auth::Bearer(value) => request.header(header::AUTHORIZATION, value),
        }
    }

    /// One-shot GET against whichever peer the directory offers. Diagnostic
    /// calls do not fail over; callers retry at their own pace.
    async fn get_diagnostic(&self, path: &str) -> Result<String> {
        let target = self.directory.acquire_target()?;
        let request = self
            .apply_auth(self.http.get(format!("{target}{path}")))
            .timeout(Duration::from_millis(self.options.timeout_ms));
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                self.directory.record_failure(&target);
                return Err(QuorumDbError::Transport(err));
            }
        };
        let status = response.status().as_u16();
        let body = response.text().await.map_err(QuorumDbError::Transport)?;
        if !(200..300).contains(&status) {
            return Err(QuorumDbError::Http { status, body });
        }
        self.directory.record_success(&target, RoleHint::Unchanged);
        Ok(body)
    }

    /// Cancellable exponential backoff with jitter before the next attempt.
    async fn wait_before_retry(&self, attempt: usize, cancel: &CancellationToken) -> Result<()> {
        let delay = backoff_delay(
            attempt,
            self.options.backoff_base_ms,
            self.options.backoff_cap_ms,
        );
        // Up to half the delay again as jitter, spreading synchronized
        // retries across client instances.
        let jitter_ms = if delay.as_millis() >= 2 {
            rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 2)
        } else {
            0
        };
        let total = delay + Duration::from_millis(jitter_ms);
        tracing::debug!(delay_ms = total.as_millis() as u64, "backing off");
        tokio::select! {
            _ = cancel.cancelled() => Err(QuorumDbError::Cancelled),
            _ = sleep(total) => Ok(()),
        }
    }
}

fn single_result(envelope: Envelope) -> Result<wire::StatementResult> {
    let count = envelope.results.len();
    let mut results = envelope.results.into_iter();
    match (results.next(), count) {
        (Some(result), 1) => Ok(result),
        _ => Err(QuorumDbError::Protocol(format!(
            "result count mismatch: expected 1, got {count}"
        ))),
    }
}

fn build_http(options: &ClientOptions) -> Result<reqwest::Client> {
    // Redirects are leadership signals here, so the client must surface
    // them instead of following.
    let mut builder = reqwest::Client::builder().redirect(redirect::Policy::none());
    if options.accept_invalid_certs {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(pem) = &options.root_cert_pem {
        let cert = reqwest::Certificate::from_pem(pem)
            .map_err(|err| QuorumDbError::Config(format!("invalid root certificate: {err}")))?;
        builder = builder.add_root_certificate(cert);
    }
    builder
        .build()
        .map_err(|err| QuorumDbError::Config(format!("failed to build http client: {err}")))
}

fn backoff_delay(attempt: usize, base_ms: u64, cap_ms: u64) -> Duration {
    let exp = attempt.min(16) as u32;
    let raw = base_ms.saturating_mul(1u64 << exp);
    Duration::from_millis(raw.min(cap_ms))
}

fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_owned()
    } else {
        format!("http://{trimmed}")
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::{backoff_delay, normalize_base_url, normalize_bearer_authorization};
    use crate::QuorumDbClient;
    use std::time::Duration;

    #[test]
    fn normalize_bearer_adds_prefix_when_missing() {
        assert_eq!(
            normalize_bearer_authorization("abc123"),
            "Bearer abc123".to_owned()
        );
    }

    #[test]
    fn normalize_bearer_keeps_existing_prefix() {
        assert_eq!(
            normalize_bearer_authorization("bEaReR abc123"),
            "bEaReR abc123".to_owned()
        );
    }

    #[test]
    fn normalize_base_url_defaults_scheme_and_trims() {
        assert_eq!(normalize_base_url("10.0.0.1:4001"), "http://10.0.0.1:4001");
        assert_eq!(
            normalize_base_url("https://db.example.com/"),
            "https://db.example.com"
        );
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_delay(0, 100, 2_000), Duration::from_millis(100));
        assert_eq!(backoff_delay(1, 100, 2_000), Duration::from_millis(200));
        assert_eq!(backoff_delay(4, 100, 2_000), Duration::from_millis(1_600));
        assert_eq!(backoff_delay(5, 100, 2_000), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(63, 100, 2_000), Duration::from_millis(2_000));
    }

    #[test]
    fn empty_seed_list_is_a_config_error() {
        let result = QuorumDbClient::new(Vec::<String>::new());
        assert!(result.is_err());
    }

    #[test]
    fn debug_redacts_credentials() {
        let client = QuorumDbClient::new(["http://127.0.0.1:4001"])
            .expect("client must build")
            .with_basic_auth("admin", "secret-password");
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-password"));
    }
}
