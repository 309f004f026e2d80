use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::{
    cluster::RoleHint,
    decode::encode_value,
    Params, QuorumDbError, Statement,
};

/// Encodes a batch into the store's request body: a JSON array where each
/// statement is `[sql, p1, p2, ...]` (positional) or `[sql, {name: value}]`
/// (named), or just `[sql]` when unparameterized.
pub(crate) fn encode_statements(statements: &[Statement]) -> Result<JsonValue, QuorumDbError> {
    let mut body = Vec::with_capacity(statements.len());
    for statement in statements {
        let mut entry = vec![JsonValue::String(statement.sql.clone())];
        match &statement.params {
            Params::Positional(values) => {
                for value in values {
                    entry.push(encode_value(value)?);
                }
            }
            Params::Named(pairs) => {
                if !pairs.is_empty() {
                    let mut map = serde_json::Map::with_capacity(pairs.len());
                    for (name, value) in pairs {
                        let name = normalize_parameter_name(name)?;
                        map.insert(name, encode_value(value)?);
                    }
                    entry.push(JsonValue::Object(map));
                }
            }
        }
        body.push(JsonValue::Array(entry));
    }
    Ok(JsonValue::Array(body))
}

fn normalize_parameter_name(name: &str) -> Result<String, QuorumDbError> {
    let normalized = name.trim_start_matches([':', '@', '$']);
    if normalized.is_empty() {
        return Err(QuorumDbError::Encode(
            "named parameter name cannot be empty".to_owned(),
        ));
    }
    Ok(normalized.to_owned())
}

/// Top-level response envelope from the query and execute endpoints.
#[allow(dead_code)]
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    /// Request-level error, e.g. a leadership rejection.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub time: Option<f64>,
    /// Whether the answering node served this request as leader.
    #[serde(default)]
    pub leader: Option<bool>,
}

/// One per-statement result, positionally aligned with the request body.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatementResult {
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub types: Option<Vec<String>>,
    #[serde(default)]
    pub values: Option<Vec<Vec<JsonValue>>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub rows_affected: Option<u64>,
    #[serde(default)]
    pub last_insert_id: Option<i64>,
    #[serde(default)]
    pub time: Option<f64>,
}

/// One membership entry from `GET /nodes`.
#[derive(Debug, Deserialize)]
pub(crate) struct NodeEntry {
    #[serde(default)]
    pub api_addr: Option<String>,
    #[serde(default)]
    pub leader: bool,
    #[serde(default)]
    pub reachable: bool,
}

pub(crate) type NodesResponse = std::collections::BTreeMap<String, NodeEntry>;

/// What the dispatcher should do with one HTTP response.
#[derive(Debug)]
pub(crate) enum Disposition {
    /// Parsed envelope plus the role the peer reported.
    Success { envelope: Envelope, role: RoleHint },
    /// Transient leadership condition. Never surfaces to callers; the peer
    /// is a reachable follower and, when present, `redirect` names the
    /// leader's base URL.
    NotLeader { redirect: Option<String> },
    /// Worth trying another peer (for idempotent requests).
    Retryable { status: u16, body: String },
    /// Surfaces to the caller as-is.
    Terminal(QuorumDbError),
}

const NOT_LEADER_MARKERS: &[&str] = &["not leader", "leadership lost", "no leader"];

fn body_reports_not_leader(body: &str) -> Option<bool> {
    let parsed: JsonValue = serde_json::from_str(body).ok()?;
    let error = parsed.get("error")?.as_str()?;
    let lower = error.to_ascii_lowercase();
    Some(NOT_LEADER_MARKERS.iter().any(|m| lower.contains(m)))
}

/// Classifies one HTTP response into a dispatcher action.
///
/// Redirect statuses carry the leader in `Location`; a 2xx body is parsed
/// and checked for a request-level leadership error; retryable statuses are
/// distinguished from terminal ones; anything unparseable where an envelope
/// was expected is a protocol error, not a SQL error.
pub(crate) fn map_response(status: u16, location: Option<&str>, body: &str) -> Disposition {
    if matches!(status, 301 | 302 | 307 | 308) {
        return Disposition::NotLeader {
            redirect: location.and_then(base_of_location),
        };
    }

    if (200..300).contains(&status) {
        match serde_json::from_str::<Envelope>(body) {
            Ok(envelope) => {
                if let Some(error) = &envelope.error {
                    let lower = error.to_ascii_lowercase();
                    if NOT_LEADER_MARKERS.iter().any(|m| lower.contains(m)) {
                        return Disposition::NotLeader { redirect: None };
                    }
                    return Disposition::Terminal(QuorumDbError::Protocol(format!(
                        "store rejected request: {error}"
                    )));
                }
                let role = match envelope.leader {
                    Some(true) => RoleHint::Leader,
                    Some(false) => RoleHint::Follower,
                    None => RoleHint::Unchanged,
                };
                Disposition::Success { envelope, role }
            }
            Err(err) => Disposition::Terminal(QuorumDbError::Protocol(format!(
                "invalid response JSON: {err}"
            ))),
        }
    } else {
        if body_reports_not_leader(body).unwrap_or(false) {
            return Disposition::NotLeader { redirect: None };
        }
        if matches!(status, 429 | 500 | 502 | 503 | 504) {
            return Disposition::Retryable {
                status,
                body: body.to_owned(),
            };
        }
        Disposition::Terminal(QuorumDbError::Http {
            status,
            body: body.to_owned(),
        })
    }
}

/// Reduces a redirect `Location` to the peer base URL, dropping the path.
fn base_of_location(location: &str) -> Option<String> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }
    let scheme_end = location.find("://").map(|i| i + 3)?;
    let path_start = location[scheme_end..]
        .find('/')
        .map_or(location.len(), |i| scheme_end + i);
    Some(location[..path_start].to_owned())
}

#[cfg(test)]
mod tests {
    use super::{base_of_location, encode_statements, map_response, Disposition};
    use crate::{cluster::RoleHint, Params, QuorumDbError, Statement, Value};
    use serde_json::json;

    #[test]
    fn positional_statements_encode_as_arrays() {
        let body = encode_statements(&[Statement::new(
            "SELECT * FROM t WHERE id = ?",
            [Value::integer(5)],
        )])
        .expect("must encode");
        assert_eq!(body, json!([["SELECT * FROM t WHERE id = ?", 5]]));
    }

    #[test]
    fn named_statements_encode_as_object_and_strip_prefix() {
        let body = encode_statements(&[Statement::new(
            "SELECT * FROM t WHERE id = :id",
            Params::named([(":id", Value::integer(5))]),
        )])
        .expect("must encode");
        assert_eq!(
            body,
            json!([["SELECT * FROM t WHERE id = :id", { "id": 5 }]])
        );
    }

    #[test]
    fn bare_statement_encodes_without_params() {
        let body = encode_statements(&[Statement::from("SELECT 1")]).expect("must encode");
        assert_eq!(body, json!([["SELECT 1"]]));
    }

    #[test]
    fn empty_named_parameter_is_an_encode_error() {
        let err = encode_statements(&[Statement::new(
            "SELECT :x",
            Params::named([(":", Value::integer(1))]),
        )])
        .expect_err("must fail");
        assert!(matches!(err, QuorumDbError::Encode(_)));
    }

    #[test]
    fn success_with_leader_flag_reports_role() {
        let body = json!({ "results": [], "leader": false }).to_string();
        match map_response(200, None, &body) {
            Disposition::Success { role, .. } => assert_eq!(role, RoleHint::Follower),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn not_leader_body_is_transient() {
        let body = json!({ "error": "not leader" }).to_string();
        assert!(matches!(
            map_response(200, None, &body),
            Disposition::NotLeader { redirect: None }
        ));
        assert!(matches!(
            map_response(503, None, &body),
            Disposition::NotLeader { redirect: None }
        ));
    }

    #[test]
    fn redirect_carries_leader_base_url() {
        match map_response(301, Some("http://10.0.0.3:4001/db/execute"), "") {
            Disposition::NotLeader { redirect } => {
                assert_eq!(redirect.as_deref(), Some("http://10.0.0.3:4001"));
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn retryable_statuses() {
        for status in [429u16, 500, 502, 503, 504] {
            assert!(matches!(
                map_response(status, None, "upstream sad"),
                Disposition::Retryable { .. }
            ));
        }
    }

    #[test]
    fn auth_failure_is_terminal() {
        assert!(matches!(
            map_response(401, None, "unauthorized"),
            Disposition::Terminal(QuorumDbError::Http { status: 401, .. })
        ));
    }

    #[test]
    fn garbage_body_is_a_protocol_error() {
        assert!(matches!(
            map_response(200, None, "<html>not json</html>"),
            Disposition::Terminal(QuorumDbError::Protocol(_))
        ));
    }

    #[test]
    fn location_base_extraction() {
        assert_eq!(
            base_of_location("https://db-2.example.com:4001/db/query?level=weak").as_deref(),
            Some("https://db-2.example.com:4001")
        );
        assert_eq!(base_of_location("nonsense"), None);
    }
}
