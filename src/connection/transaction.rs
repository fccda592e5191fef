//! Transactions
//!
//! MULTI / EXEC with per-command acknowledgment checks.
//!
//! ## Exchange
//! ```text
//! client: MULTI, cmd1 .. cmdN          (pipelined)
//! server: +OK, +QUEUED x N
//! client: EXEC                          (only if every ack matched)
//! server: *N <result1> .. <resultN>
//!
//! any ack mismatch:
//! client: DISCARD
//! server: +OK
//! ```
//!
//! EXEC waits for the acknowledgments, costing a second round trip, so a
//! rejected command can be answered with DISCARD instead of EXEC.

use bytes::BytesMut;

use crate::config::TransactionReplies;
use crate::error::{RedwireError, Result};
use crate::protocol::{encode_command, CommandRequest, ReplyValue};

use super::Connection;

const START_ACK: &str = "OK";
const QUEUED_ACK: &str = "QUEUED";

/// How a transaction ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// EXEC ran; replies shaped by the configured `TransactionReplies`
    Committed(Vec<ReplyValue>),

    /// Nothing was executed. `cause` is the reply that stopped it: a
    /// deviating acknowledgment, an EXEC error, or a null EXEC array
    /// after a watched key changed.
    Aborted { cause: ReplyValue },
}

impl TransactionOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TransactionOutcome::Committed(_))
    }

    /// Committed replies, or `TransactionAborted` carrying the cause
    pub fn into_result(self) -> Result<Vec<ReplyValue>> {
        match self {
            TransactionOutcome::Committed(replies) => Ok(replies),
            TransactionOutcome::Aborted { cause } => Err(RedwireError::TransactionAborted { cause }),
        }
    }
}

impl Connection {
    /// Run `commands` atomically
    ///
    /// An aborted transaction is reported as `TransactionAborted`.
    pub fn transaction<I, C>(&mut self, commands: I) -> Result<Vec<ReplyValue>>
    where
        I: IntoIterator<Item = C>,
        C: Into<CommandRequest>,
    {
        self.try_transaction(commands)?.into_result()
    }

    /// Run `commands` atomically and report the outcome as a value
    ///
    /// `Err` is reserved for transport and protocol failures.
    pub fn try_transaction<I, C>(&mut self, commands: I) -> Result<TransactionOutcome>
    where
        I: IntoIterator<Item = C>,
        C: Into<CommandRequest>,
    {
        if self.pending() > 0 {
            return Err(RedwireError::PipelineBusy {
                pending: self.pending(),
            });
        }

        // Encode everything first so a bad command fails before any I/O.
        let mut encoded = BytesMut::new();
        encode_command(&CommandRequest::multi(), &mut encoded)?;
        let mut queued = 0usize;
        for command in commands {
            encode_command(&command.into(), &mut encoded)?;
            queued += 1;
        }

        self.append_encoded(&encoded, queued + 1)?;

        // Always drain every acknowledgment to keep replies aligned.
        let mut acks = Vec::with_capacity(queued + 1);
        for _ in 0..=queued {
            acks.push(self.next_raw_reply()?);
        }

        let deviation = acks.iter().enumerate().find(|(idx, ack)| {
            let expected = if *idx == 0 { START_ACK } else { QUEUED_ACK };
            !ack.is_ack(expected)
        });

        if let Some((idx, cause)) = deviation {
            tracing::debug!(
                "Transaction on {} aborted at reply {}: {}",
                self.peer_addr(),
                idx,
                cause
            );
            let cause = cause.clone();
            self.append(CommandRequest::discard())?;
            let discarded = self.next_raw_reply()?;
            if discarded.is_error() {
                tracing::debug!("DISCARD on {} replied {}", self.peer_addr(), discarded);
            }
            return Ok(TransactionOutcome::Aborted { cause });
        }

        self.append(CommandRequest::exec())?;
        let commit = self.next_raw_reply()?;

        let results = match commit {
            ReplyValue::Array(Some(results)) => results,
            cause @ (ReplyValue::Error(_) | ReplyValue::Array(None)) => {
                tracing::debug!("Transaction on {} not committed: {}", self.peer_addr(), cause);
                return Ok(TransactionOutcome::Aborted { cause });
            }
            other => {
                return Err(self.fail(RedwireError::Protocol(format!(
                    "EXEC replied with a non-array: {}",
                    other
                ))))
            }
        };

        if results.len() != queued {
            return Err(self.fail(RedwireError::Protocol(format!(
                "EXEC returned {} results for {} queued commands",
                results.len(),
                queued
            ))));
        }

        let mode = self.config().reply_mode;
        let replies = match mode.transaction {
            TransactionReplies::ResultsOnly => results,
            TransactionReplies::Full => {
                acks.push(ReplyValue::Array(Some(results)));
                acks
            }
        };

        Ok(TransactionOutcome::Committed(
            replies
                .into_iter()
                .map(|r| r.apply_status_mode(mode.status))
                .collect(),
        ))
    }
}
