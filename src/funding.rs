// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Funding manager for the custodial operator account.
//!
//! The operator account is the only genuinely shared mutable resource in the
//! core: every funding transfer and every operator-signed registry call
//! spends one of its nonces. A single `tokio::sync::Mutex` sequencer owns
//! the nonce counter; the lock is held across submit and confirm, so at most
//! one operator transaction is in flight at a time and assigned nonces are
//! strictly increasing and gap-free. No other component touches the nonce.
//!
//! Ambiguous outcomes (confirmation timeout, transport failure mid-wait)
//! invalidate the cached nonce, forcing the next submission to re-read the
//! account's transaction count instead of guessing.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use tokio::sync::Mutex;

use crate::error::RelayerError;
use crate::ledger::{Ledger, RegistryCall, TxRecord, TxRef};

/// Cached next-nonce for the operator account. `None` means unknown:
/// re-read from the chain before the next submission.
#[derive(Debug, Default)]
struct NonceSequencer {
    next: Option<u64>,
}

impl NonceSequencer {
    async fn reserve<L: Ledger>(
        &mut self,
        ledger: &L,
        operator: Address,
    ) -> Result<u64, RelayerError> {
        match self.next {
            Some(nonce) => Ok(nonce),
            None => {
                let nonce = ledger.transaction_count(operator).await?;
                self.next = Some(nonce);
                Ok(nonce)
            }
        }
    }

    /// The reserved nonce was consumed on-chain (the transaction was
    /// included, successfully or not).
    fn commit(&mut self) {
        self.next = self.next.map(|n| n + 1);
    }

    /// Outcome unknown; drop the cache and re-read next time.
    fn invalidate(&mut self) {
        self.next = None;
    }
}

/// Funds derived voter accounts and sequences all operator submissions.
pub struct FundingManager<L: Ledger> {
    ledger: Arc<L>,
    operator: PrivateKeySigner,
    min_voter_balance: U256,
    top_up_amount: U256,
    confirmation_timeout: Duration,
    sequencer: Mutex<NonceSequencer>,
}

impl<L: Ledger> FundingManager<L> {
    pub fn new(
        ledger: Arc<L>,
        operator: PrivateKeySigner,
        min_voter_balance: U256,
        top_up_amount: U256,
        confirmation_timeout: Duration,
    ) -> Self {
        FundingManager {
            ledger,
            operator,
            min_voter_balance,
            top_up_amount,
            confirmation_timeout,
            sequencer: Mutex::new(NonceSequencer::default()),
        }
    }

    pub fn operator_address(&self) -> Address {
        self.operator.address()
    }

    /// Ensure `address` can pay its own transaction fees.
    ///
    /// No-op (`Ok(None)`) when the balance already meets the threshold.
    /// Otherwise submits one top-up transfer through the sequencer and waits
    /// for inclusion. A rejected submission is retried exactly once with a
    /// raised priority fee on the same nonce; a confirmation timeout is
    /// surfaced and never retried here, since the transfer may still land.
    pub async fn ensure_funded(&self, address: Address) -> Result<Option<TxRef>, RelayerError> {
        if self.ledger.native_balance(address).await? >= self.min_voter_balance {
            return Ok(None);
        }

        let mut seq = self.sequencer.lock().await;

        // Re-check under the lock: a concurrent call for the same voter may
        // have funded it while we waited.
        if self.ledger.native_balance(address).await? >= self.min_voter_balance {
            return Ok(None);
        }

        let operator_balance = self.ledger.native_balance(self.operator.address()).await?;
        if operator_balance < self.top_up_amount {
            tracing::error!(
                operator = %self.operator.address(),
                "operator funding account exhausted, halting top-ups"
            );
            return Err(RelayerError::InsufficientOperatorBalance);
        }

        let nonce = seq.reserve(self.ledger.as_ref(), self.operator.address()).await?;

        let tx = match self
            .ledger
            .transfer(&self.operator, address, self.top_up_amount, nonce, false)
            .await
        {
            Ok(tx) => tx,
            Err(RelayerError::SubmissionRejected(reason)) => {
                tracing::warn!(%reason, nonce, "top-up rejected, retrying once with raised fee");
                match self
                    .ledger
                    .transfer(&self.operator, address, self.top_up_amount, nonce, true)
                    .await
                {
                    Ok(tx) => tx,
                    Err(err) => {
                        // A clean rejection leaves the nonce unconsumed;
                        // anything else is ambiguous.
                        if !matches!(err, RelayerError::SubmissionRejected(_)) {
                            seq.invalidate();
                        }
                        return Err(err);
                    }
                }
            }
            Err(other) => {
                seq.invalidate();
                return Err(other);
            }
        };

        match self.ledger.await_inclusion(tx, self.confirmation_timeout).await {
            Ok(record) => {
                // Included transactions consume the nonce even when they fail.
                seq.commit();
                if !record.success {
                    tracing::warn!(voter = %address, %tx, "top-up transaction reverted");
                    return Err(RelayerError::TxReverted(tx));
                }
                tracing::info!(voter = %address, %tx, "voter account topped up");
                Ok(Some(tx))
            }
            Err(err) => {
                seq.invalidate();
                Err(err)
            }
        }
    }

    /// Submit an operator-signed registry call through the sequencer and
    /// wait for inclusion.
    ///
    /// Administrative calls share the operator account with funding
    /// transfers, so they take the same lock and the same nonce discipline.
    pub async fn submit_operator_call(
        &self,
        call: &RegistryCall,
    ) -> Result<TxRecord, RelayerError> {
        let mut seq = self.sequencer.lock().await;
        let nonce = seq.reserve(self.ledger.as_ref(), self.operator.address()).await?;

        let tx = match self.ledger.submit(&self.operator, call, Some(nonce)).await {
            Ok(tx) => tx,
            Err(err) => {
                if !matches!(err, RelayerError::Rejected(_) | RelayerError::SubmissionRejected(_)) {
                    seq.invalidate();
                }
                return Err(err);
            }
        };

        match self.ledger.await_inclusion(tx, self.confirmation_timeout).await {
            Ok(record) => {
                seq.commit();
                if !record.success {
                    tracing::warn!(op = call.op_name(), %tx, "operator transaction reverted");
                    return Err(RelayerError::TxReverted(tx));
                }
                Ok(record)
            }
            Err(err) => {
                seq.invalidate();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::InMemoryLedger;

    const ETH: u128 = 1_000_000_000_000_000_000;

    fn signer(seed: u8) -> PrivateKeySigner {
        let mut key = [0u8; 32];
        key[31] = seed;
        PrivateKeySigner::from_slice(&key).unwrap()
    }

    fn manager(ledger: Arc<InMemoryLedger>, operator: PrivateKeySigner) -> FundingManager<InMemoryLedger> {
        FundingManager::new(
            ledger,
            operator,
            U256::from(ETH / 100),
            U256::from(ETH / 50),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn funded_voter_is_a_noop() {
        let ledger = Arc::new(InMemoryLedger::new());
        let operator = signer(1);
        ledger.credit(operator.address(), U256::from(ETH)).await;

        let voter = Address::with_last_byte(9);
        ledger.credit(voter, U256::from(ETH)).await;

        let funding = manager(ledger.clone(), operator);
        assert_eq!(funding.ensure_funded(voter).await.unwrap(), None);
        assert_eq!(ledger.operator_nonce_history().await.len(), 0);
    }

    #[tokio::test]
    async fn underfunded_voter_gets_one_transfer() {
        let ledger = Arc::new(InMemoryLedger::new());
        let operator = signer(1);
        ledger.credit(operator.address(), U256::from(ETH)).await;

        let voter = Address::with_last_byte(9);
        let funding = manager(ledger.clone(), operator);

        let tx = funding.ensure_funded(voter).await.unwrap();
        assert!(tx.is_some());
        assert_eq!(
            ledger.native_balance(voter).await.unwrap(),
            U256::from(ETH / 50)
        );

        // Second call sees the balance and does nothing.
        assert_eq!(funding.ensure_funded(voter).await.unwrap(), None);
    }

    #[tokio::test]
    async fn exhausted_operator_is_fatal() {
        let ledger = Arc::new(InMemoryLedger::new());
        let operator = signer(1);
        // Operator has less than one top-up.
        ledger.credit(operator.address(), U256::from(ETH / 1000)).await;

        let funding = manager(ledger.clone(), operator);
        let err = funding
            .ensure_funded(Address::with_last_byte(9))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayerError::InsufficientOperatorBalance));
        assert!(ledger.operator_nonce_history().await.is_empty());
    }

    #[tokio::test]
    async fn rejected_submission_is_retried_once_with_same_nonce() {
        let ledger = Arc::new(InMemoryLedger::new());
        let operator = signer(1);
        ledger.credit(operator.address(), U256::from(ETH)).await;
        ledger.reject_next_transfers(1).await;

        let funding = manager(ledger.clone(), operator);
        let tx = funding
            .ensure_funded(Address::with_last_byte(9))
            .await
            .unwrap();
        assert!(tx.is_some());
        assert_eq!(ledger.operator_nonce_history().await, vec![0]);
    }

    #[tokio::test]
    async fn double_rejection_is_not_retried_again() {
        let ledger = Arc::new(InMemoryLedger::new());
        let operator = signer(1);
        ledger.credit(operator.address(), U256::from(ETH)).await;
        ledger.reject_next_transfers(2).await;

        let funding = manager(ledger.clone(), operator);
        let err = funding
            .ensure_funded(Address::with_last_byte(9))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayerError::SubmissionRejected(_)));
    }

    #[tokio::test]
    async fn reverted_top_up_commits_the_nonce() {
        let ledger = Arc::new(InMemoryLedger::new());
        let operator = signer(1);
        ledger.credit(operator.address(), U256::from(ETH)).await;
        ledger.revert_next_inclusions(1).await;

        let funding = manager(ledger.clone(), operator);
        let err = funding
            .ensure_funded(Address::with_last_byte(9))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayerError::TxReverted(_)));

        // The reverted inclusion consumed nonce 0; the next top-up takes 1.
        funding
            .ensure_funded(Address::with_last_byte(9))
            .await
            .unwrap();
        assert_eq!(ledger.operator_nonce_history().await, vec![0, 1]);
    }

    #[tokio::test]
    async fn timeout_invalidates_the_cached_nonce() {
        let ledger = Arc::new(InMemoryLedger::new());
        let operator = signer(1);
        ledger.credit(operator.address(), U256::from(ETH)).await;

        let funding = manager(ledger.clone(), operator);

        ledger.withhold_receipts(true).await;
        let err = funding
            .ensure_funded(Address::with_last_byte(9))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayerError::ConfirmationTimeout(_)));

        // After the ambiguous outcome the next call re-reads the chain nonce
        // and still lands a gap-free sequence.
        ledger.withhold_receipts(false).await;
        funding
            .ensure_funded(Address::with_last_byte(10))
            .await
            .unwrap();
        let history = ledger.operator_nonce_history().await;
        assert_eq!(history.last(), Some(&(history.len() as u64 - 1)));
    }

    #[tokio::test]
    async fn concurrent_top_ups_get_gap_free_nonces() {
        let ledger = Arc::new(InMemoryLedger::new());
        let operator = signer(1);
        ledger.credit(operator.address(), U256::from(10 * ETH)).await;

        let funding = Arc::new(manager(ledger.clone(), operator));

        let mut handles = Vec::new();
        for n in 1..=8u8 {
            let funding = funding.clone();
            handles.push(tokio::spawn(async move {
                funding.ensure_funded(Address::with_last_byte(n)).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_some());
        }

        let history = ledger.operator_nonce_history().await;
        assert_eq!(history, (0..8).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn operator_calls_share_the_sequencer() {
        let ledger = Arc::new(InMemoryLedger::new());
        let operator = signer(1);
        ledger.credit(operator.address(), U256::from(ETH)).await;

        let funding = manager(ledger.clone(), operator);
        let now = InMemoryLedger::DEFAULT_NOW;
        let record = funding
            .submit_operator_call(&RegistryCall::CreateElection {
                title: "Board".into(),
                description: String::new(),
                start_time: now,
                end_time: now + 3600,
            })
            .await
            .unwrap();
        assert!(record.success);

        funding
            .ensure_funded(Address::with_last_byte(9))
            .await
            .unwrap();

        assert_eq!(ledger.operator_nonce_history().await, vec![0, 1]);
    }
}
