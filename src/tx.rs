use tokio_util::sync::CancellationToken;

use crate::{
    decode::decode_exec_outcome, ExecOutcome, QuorumDbClient, QuorumDbError, Result, Statement,
};

/// Client-side transaction lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxState {
    Open,
    Committing,
    Committed,
    Aborted,
}

impl TxState {
    fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        }
    }
}

/// Buffers statements locally and submits them as one atomic batch on
/// commit. Nothing is sent to the store before [`Transaction::commit`], so
/// [`Transaction::rollback`] and dropping an open transaction are purely
/// local.
///
/// Owned by one caller at a time: methods take `&mut self` and the type is
/// deliberately not shareable mid-flight. Once committed or aborted the
/// object is terminal; further use returns
/// [`QuorumDbError::TransactionClosed`].
#[derive(Debug)]
pub struct Transaction<'a> {
    client: &'a QuorumDbClient,
    pending: Vec<Statement>,
    state: TxState,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(client: &'a QuorumDbClient) -> Self {
        Self {
            client,
            pending: Vec::new(),
            state: TxState::Open,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Number of buffered statements.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == TxState::Open {
            Ok(())
        } else {
            Err(QuorumDbError::TransactionClosed {
                state: self.state.name(),
            })
        }
    }

    /// Appends one statement to the pending batch, preserving order.
    pub fn append(&mut self, statement: impl Into<Statement>) -> Result<()> {
        self.ensure_open()?;
        self.pending.push(statement.into());
        Ok(())
    }

    /// Submits the pending batch as a single atomic, leader-routed request.
    ///
    /// On success the transaction is `Committed` and the per-statement
    /// outcomes are returned in append order. On any surfaced failure the
    /// transaction is `Aborted`; the client must not assume partial
    /// application even if it occurred server-side.
    pub async fn commit(&mut self) -> Result<Vec<ExecOutcome>> {
        self.commit_with(&CancellationToken::new()).await
    }

    /// [`Transaction::commit`] with caller-supplied cancellation.
    pub async fn commit_with(&mut self, cancel: &CancellationToken) -> Result<Vec<ExecOutcome>> {
        self.ensure_open()?;
        self.state = TxState::Committing;

        if self.pending.is_empty() {
            self.state = TxState::Committed;
            return Ok(Vec::new());
        }

        let statements = std::mem::take(&mut self.pending);
        let envelope = match self.client.execute_atomic(&statements, cancel).await {
            Ok(envelope) => envelope,
            Err(err) => {
                self.state = TxState::Aborted;
                return Err(err);
            }
        };

        // The store applies the batch all-or-nothing; any per-statement
        // error therefore means the whole transaction rolled back.
        for (index, result) in envelope.results.iter().enumerate() {
            if let Some(message) = &result.error {
                self.state = TxState::Aborted;
                return Err(QuorumDbError::Sql {
                    index,
                    message: message.clone(),
                });
            }
        }

        if envelope.results.len() != statements.len() {
            self.state = TxState::Aborted;
            return Err(QuorumDbError::Protocol(format!(
                "result count mismatch: expected {}, got {}",
                statements.len(),
                envelope.results.len()
            )));
        }

        let outcomes = envelope
            .results
            .into_iter()
            .map(decode_exec_outcome)
            .collect();
        self.state = TxState::Committed;
        Ok(outcomes)
    }

    /// Discards the pending batch without any network call and moves the
    /// transaction to `Aborted`.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.pending.clear();
        self.state = TxState::Aborted;
        Ok(())
    }
}
