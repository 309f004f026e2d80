use crate::Statement;

/// Routing class of a batch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatementKind {
    /// Every statement is read-only; may be served by a follower.
    Read,
    /// Every statement mutates state or schema; leader-routed.
    Write,
    /// Reads and writes together; routed and retried as a write.
    Mixed,
}

/// Result of classifying a batch before dispatch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Classification {
    pub kind: StatementKind,
    /// Safe to re-send blindly. True only for pure reads unless the caller
    /// marked the batch safe to retry.
    pub idempotent: bool,
}

impl Classification {
    /// Whether the batch routes and retries as a write. True for `Write`
    /// and `Mixed` alike.
    pub fn is_write(self) -> bool {
        !matches!(self.kind, StatementKind::Read)
    }
}

const WRITE_VERBS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "REPLACE", "CREATE", "DROP", "ALTER", "BEGIN", "COMMIT",
    "ROLLBACK", "VACUUM", "REINDEX", "ATTACH", "DETACH",
];

/// Classifies a batch lexically. Never executes or validates SQL; malformed
/// text is rejected downstream by the store.
pub fn classify(statements: &[Statement]) -> Classification {
    let mut reads = 0usize;
    let mut writes = 0usize;
    for statement in statements {
        if is_read_only(&statement.sql) {
            reads += 1;
        } else {
            writes += 1;
        }
    }
    let kind = match (reads, writes) {
        (_, 0) => StatementKind::Read,
        (0, _) => StatementKind::Write,
        _ => StatementKind::Mixed,
    };
    Classification {
        kind,
        idempotent: kind == StatementKind::Read,
    }
}

/// Lexical check: does this statement text start with a read-only verb?
///
/// `WITH` introduces a CTE that may front either a query or a DML statement,
/// so it only counts as a read when no write verb appears later in the text.
pub fn is_read_only(sql: &str) -> bool {
    let rest = skip_leading_trivia(sql);
    let Some(keyword) = leading_keyword(rest) else {
        return false;
    };
    match keyword.as_str() {
        "SELECT" | "VALUES" | "EXPLAIN" | "PRAGMA" => true,
        "WITH" => !contains_write_verb(rest),
        _ => false,
    }
}

/// Skips whitespace, `--` line comments and `/* */` block comments.
fn skip_leading_trivia(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(stripped) = rest.strip_prefix("--") {
            rest = stripped.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(stripped) = rest.strip_prefix("/*") {
            rest = stripped.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            return rest;
        }
    }
}

fn leading_keyword(rest: &str) -> Option<String> {
    let word: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if word.is_empty() {
        None
    } else {
        Some(word.to_ascii_uppercase())
    }
}

fn contains_write_verb(sql: &str) -> bool {
    let upper = sql.to_ascii_uppercase();
    let mut start = 0usize;
    for (i, c) in upper.char_indices() {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            if i > start && WRITE_VERBS.contains(&&upper[start..i]) {
                return true;
            }
            start = i + c.len_utf8();
        }
    }
    start < upper.len() && WRITE_VERBS.contains(&&upper[start..])
}

#[cfg(test)]
mod tests {
    use super::{classify, is_read_only, StatementKind};
    use crate::Statement;

    fn batch(sqls: &[&str]) -> Vec<Statement> {
        sqls.iter().map(|s| Statement::from(*s)).collect()
    }

    #[test]
    fn read_verbs_are_reads() {
        for sql in [
            "SELECT 1",
            "select * from t",
            "  VALUES (1)",
            "EXPLAIN SELECT 1",
            "PRAGMA table_info(t)",
        ] {
            assert!(is_read_only(sql), "{sql}");
        }
    }

    #[test]
    fn write_verbs_are_writes() {
        for sql in [
            "INSERT INTO t VALUES (1)",
            "update t set a = 1",
            "DELETE FROM t",
            "CREATE TABLE t (a)",
            "DROP TABLE t",
        ] {
            assert!(!is_read_only(sql), "{sql}");
        }
    }

    #[test]
    fn leading_comments_are_skipped() {
        assert!(is_read_only("-- note\nSELECT 1"));
        assert!(is_read_only("/* note */ SELECT 1"));
        assert!(!is_read_only("/* note */ DELETE FROM t"));
    }

    #[test]
    fn cte_fronting_dml_is_a_write() {
        assert!(is_read_only("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!is_read_only(
            "WITH x AS (SELECT 1) INSERT INTO t SELECT * FROM x"
        ));
    }

    #[test]
    fn any_write_makes_the_batch_a_write() {
        let c = classify(&batch(&["SELECT 1", "DELETE FROM t", "SELECT 2"]));
        assert_eq!(c.kind, StatementKind::Mixed);
        assert!(!c.idempotent);

        let c = classify(&batch(&["DELETE FROM t"]));
        assert_eq!(c.kind, StatementKind::Write);
        assert!(!c.idempotent);
    }

    #[test]
    fn pure_reads_are_idempotent() {
        let c = classify(&batch(&["SELECT 1", "SELECT 2"]));
        assert_eq!(c.kind, StatementKind::Read);
        assert!(c.idempotent);
    }

    #[test]
    fn empty_or_garbage_text_is_a_write() {
        // Unrecognized text must take the conservative route to the leader.
        assert!(!is_read_only(""));
        assert!(!is_read_only("   "));
        assert!(!is_read_only("frobnicate t"));
    }
}
