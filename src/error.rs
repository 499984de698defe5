// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy for the relayer core.
//!
//! Four classes, each with distinct variants so callers never match on
//! message text:
//!
//! - **Input** - malformed arguments, rejected before anything is submitted.
//! - **Policy** - expected business outcomes from the registry
//!   (`AlreadyVoted`, `NotRegistered`, ...), surfaced verbatim, never retried.
//! - **Infrastructure** - RPC failures, confirmation timeouts, operator
//!   balance exhaustion. Timeouts mean "unknown outcome": re-read chain state
//!   before any resubmission.
//! - **Protocol** - an expected event missing from a successful receipt, or
//!   a receipt that does not back its claimed vote. Fatal integrity issues.

use crate::ledger::TxRef;
use crate::registry::RegistryRejection;

/// Errors surfaced by the relayer core.
#[derive(Debug, thiserror::Error)]
pub enum RelayerError {
    /// Malformed input, rejected synchronously. Never submitted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Policy rejection from the election registry. Expected business
    /// outcome; surfaced to the caller unchanged.
    #[error(transparent)]
    Rejected(#[from] RegistryRejection),

    /// RPC transport or node failure.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The node refused the submission (fee too low, nonce conflict, ...).
    /// The transaction never entered the chain; the funding path retries
    /// this once with a raised fee.
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// The transaction was included but reverted on-chain. Its nonce is
    /// consumed. Deterministic for the same state; never blindly retried.
    #[error("transaction {0} reverted on-chain")]
    TxReverted(TxRef),

    /// Inclusion was not observed within the bounded wait. The transaction
    /// may still land; callers must re-read ledger state before retrying.
    #[error("confirmation timeout for {0}")]
    ConfirmationTimeout(TxRef),

    /// The funding account cannot cover the requested top-up. Fatal until
    /// the operator account is replenished.
    #[error("operator funding account balance below required top-up")]
    InsufficientOperatorBalance,

    /// A successful receipt did not carry the expected registry event, or
    /// carried one the decoder does not recognize. Indicates the deployed
    /// registry and this build disagree on the event schema.
    #[error("event decode: {0}")]
    EventDecode(String),

    /// No receipt exists for the transaction reference in a vote proof.
    #[error("vote proof: no receipt found for {0}")]
    ProofNotFound(TxRef),

    /// The referenced transaction exists but failed on-chain.
    #[error("vote proof: transaction {0} failed on-chain")]
    ProofTxFailed(TxRef),

    /// The referenced transaction succeeded but its vote event does not
    /// match the claimed (election, candidate, voter).
    #[error("vote proof mismatch: {0}")]
    ProofMismatch(String),
}

impl RelayerError {
    /// True for expected business outcomes (registry policy rejections).
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, RelayerError::Rejected(_))
    }

    /// True for ambiguous infrastructure failures that a caller may retry
    /// after re-reading ledger state. Policy and protocol errors are never
    /// retryable.
    pub fn is_retryable_after_recheck(&self) -> bool {
        matches!(
            self,
            RelayerError::Rpc(_) | RelayerError::ConfirmationTimeout(_)
        )
    }
}
