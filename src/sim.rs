// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process ledger.
//!
//! [`InMemoryLedger`] implements [`Ledger`] over the registry state machine
//! behind a mutex: deterministic transaction references, instant inclusion,
//! per-account nonce book-keeping with gap/reuse detection, and fault
//! injection (rejected submissions, withheld receipts, reverted
//! inclusions). It exists for tests and local development runs; production
//! uses `chain::EvmLedger`.
//!
//! Nonce discipline mirrors a real node: a submission with an explicit nonce
//! other than the account's next transaction count is rejected, and an
//! included transaction consumes exactly one nonce.

use std::collections::HashMap;

use alloy::primitives::{keccak256, Address, U256};
use alloy::signers::local::PrivateKeySigner;
use tokio::sync::Mutex;

use crate::error::RelayerError;
use crate::ledger::{Ledger, RegistryCall, RegistryEvent, TxRecord, TxRef};
use crate::models::{ElectionResults, VoterStatus};
use crate::registry::RegistryState;

#[derive(Debug, Default)]
struct Inner {
    registry: RegistryState,
    now: u64,
    balances: HashMap<Address, U256>,
    /// Next transaction count per account.
    nonces: HashMap<Address, u64>,
    receipts: HashMap<TxRef, TxRecord>,
    next_block: u64,
    tx_counter: u64,
    /// Fault injection: reject this many upcoming transfer submissions.
    reject_transfers: u32,
    /// Fault injection: accepted submissions never land while set.
    withhold_receipts: bool,
    /// Fault injection: this many upcoming submissions are included but
    /// revert, consuming their nonce without applying state.
    revert_inclusions: u32,
    /// Fault injection: included transactions carry no events, simulating a
    /// registry whose event schema drifted from this build.
    omit_events: bool,
    /// Every explicit nonce accepted, in order. Lets tests assert the
    /// operator sequence is gap-free.
    sequenced_nonces: Vec<u64>,
}

/// In-process [`Ledger`] over the registry state machine.
#[derive(Debug)]
pub struct InMemoryLedger {
    inner: Mutex<Inner>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    /// Fixed epoch the simulated clock starts at.
    pub const DEFAULT_NOW: u64 = 1_700_000_000;

    pub fn new() -> Self {
        InMemoryLedger {
            inner: Mutex::new(Inner {
                now: Self::DEFAULT_NOW,
                next_block: 1,
                ..Inner::default()
            }),
        }
    }

    /// Move the simulated clock.
    pub async fn set_now(&self, now: u64) {
        self.inner.lock().await.now = now;
    }

    pub async fn now(&self) -> u64 {
        self.inner.lock().await.now
    }

    /// Mint balance for an account.
    pub async fn credit(&self, address: Address, amount: U256) {
        let mut inner = self.inner.lock().await;
        let entry = inner.balances.entry(address).or_default();
        *entry += amount;
    }

    /// Reject the next `count` transfer submissions.
    pub async fn reject_next_transfers(&self, count: u32) {
        self.inner.lock().await.reject_transfers = count;
    }

    /// While set, submissions are accepted into the mempool but never mined:
    /// nothing executes, no nonce is consumed, and bounded inclusion waits
    /// time out.
    pub async fn withhold_receipts(&self, withhold: bool) {
        self.inner.lock().await.withhold_receipts = withhold;
    }

    /// The next `count` submissions are included but revert on-chain,
    /// consuming their nonce without applying any state change.
    pub async fn revert_next_inclusions(&self, count: u32) {
        self.inner.lock().await.revert_inclusions = count;
    }

    /// While set, included transactions carry no events. Simulates event
    /// schema drift between the deployed registry and this build.
    pub async fn omit_events(&self, omit: bool) {
        self.inner.lock().await.omit_events = omit;
    }

    /// Explicit nonces accepted so far, in submission order.
    pub async fn operator_nonce_history(&self) -> Vec<u64> {
        self.inner.lock().await.sequenced_nonces.clone()
    }

    /// Record a transaction that was included but reverted. Returns its
    /// reference. Test hook for reconciliation of failed transactions.
    pub async fn record_failed_tx(&self) -> TxRef {
        let mut inner = self.inner.lock().await;
        let tx = inner.mint_tx_ref();
        inner.include_failed(tx);
        tx
    }
}

impl Inner {
    fn mint_tx_ref(&mut self) -> TxRef {
        self.tx_counter += 1;
        TxRef(keccak256(self.tx_counter.to_be_bytes()))
    }

    fn mint_block(&mut self) -> u64 {
        let block = self.next_block;
        self.next_block += 1;
        block
    }

    fn check_nonce(&mut self, account: Address, nonce: u64) -> Result<(), RelayerError> {
        let expected = self.nonces.get(&account).copied().unwrap_or(0);
        if nonce != expected {
            return Err(RelayerError::SubmissionRejected(format!(
                "nonce {nonce} does not match account transaction count {expected}"
            )));
        }
        Ok(())
    }

    fn consume_nonce(&mut self, account: Address) {
        *self.nonces.entry(account).or_default() += 1;
    }

    fn include_failed(&mut self, tx: TxRef) {
        let block_number = self.mint_block();
        self.receipts.insert(
            tx,
            TxRecord {
                tx_ref: tx,
                block_number,
                success: false,
                events: Vec::new(),
            },
        );
    }

    fn include(&mut self, tx: TxRef, events: Vec<RegistryEvent>) {
        let events = if self.omit_events { Vec::new() } else { events };
        let block_number = self.mint_block();
        self.receipts.insert(
            tx,
            TxRecord {
                tx_ref: tx,
                block_number,
                success: true,
                events,
            },
        );
    }
}

impl Ledger for InMemoryLedger {
    async fn native_balance(&self, address: Address) -> Result<U256, RelayerError> {
        Ok(self
            .inner
            .lock()
            .await
            .balances
            .get(&address)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, RelayerError> {
        Ok(self
            .inner
            .lock()
            .await
            .nonces
            .get(&address)
            .copied()
            .unwrap_or(0))
    }

    async fn transfer(
        &self,
        from: &PrivateKeySigner,
        to: Address,
        amount: U256,
        nonce: u64,
        _bump_fee: bool,
    ) -> Result<TxRef, RelayerError> {
        let mut inner = self.inner.lock().await;

        if inner.reject_transfers > 0 {
            inner.reject_transfers -= 1;
            return Err(RelayerError::SubmissionRejected(
                "transaction underpriced".to_string(),
            ));
        }

        let sender = from.address();
        inner.check_nonce(sender, nonce)?;

        let balance = inner.balances.get(&sender).copied().unwrap_or(U256::ZERO);
        if balance < amount {
            return Err(RelayerError::SubmissionRejected(
                "insufficient funds for transfer".to_string(),
            ));
        }

        let tx = inner.mint_tx_ref();
        if inner.withhold_receipts {
            // Accepted into the mempool but never mined: nothing executes
            // and no nonce is consumed.
            return Ok(tx);
        }

        inner.consume_nonce(sender);
        inner.sequenced_nonces.push(nonce);
        if inner.revert_inclusions > 0 {
            inner.revert_inclusions -= 1;
            inner.include_failed(tx);
            return Ok(tx);
        }

        inner.balances.insert(sender, balance - amount);
        let recipient = inner.balances.entry(to).or_default();
        *recipient += amount;
        inner.include(tx, Vec::new());
        Ok(tx)
    }

    async fn submit(
        &self,
        signer: &PrivateKeySigner,
        call: &RegistryCall,
        nonce: Option<u64>,
    ) -> Result<TxRef, RelayerError> {
        let mut inner = self.inner.lock().await;
        let sender = signer.address();

        if let Some(nonce) = nonce {
            inner.check_nonce(sender, nonce)?;
        }

        if inner.withhold_receipts {
            // Accepted into the mempool but never mined: nothing executes
            // and no nonce is consumed.
            return Ok(inner.mint_tx_ref());
        }

        if inner.revert_inclusions > 0 {
            inner.revert_inclusions -= 1;
            inner.consume_nonce(sender);
            if let Some(nonce) = nonce {
                inner.sequenced_nonces.push(nonce);
            }
            let tx = inner.mint_tx_ref();
            inner.include_failed(tx);
            return Ok(tx);
        }

        let now = inner.now;
        // Policy rejections surface at submission time, the way a revert
        // surfaces during gas estimation. The nonce is not consumed.
        let events = match call.clone() {
            RegistryCall::CreateElection {
                title,
                description,
                start_time,
                end_time,
            } => {
                inner
                    .registry
                    .create_election(&title, &description, start_time, end_time, now)?
                    .1
            }
            RegistryCall::AddCandidate {
                election_id,
                name,
                party,
                image_ref,
            } => {
                inner
                    .registry
                    .add_candidate(election_id, &name, &party, &image_ref)?
                    .1
            }
            RegistryCall::RegisterVoter { election_id, voter } => {
                inner.registry.register_voter(election_id, voter)?
            }
            RegistryCall::BatchRegisterVoters { election_id, voters } => {
                // Reject before applying, so a failed batch leaves no
                // partial registrations (the contract reverts atomically).
                let mut seen = std::collections::HashSet::new();
                for voter in &voters {
                    if !seen.insert(*voter)
                        || inner.registry.voter_status(election_id, *voter)?.registered
                    {
                        return Err(crate::registry::RegistryRejection::AlreadyRegistered.into());
                    }
                }
                let mut events = Vec::new();
                for voter in voters {
                    events.extend(inner.registry.register_voter(election_id, voter)?);
                }
                events
            }
            RegistryCall::SetElectionActive {
                election_id,
                active,
            } => inner.registry.set_active(election_id, active)?,
            RegistryCall::CastVote {
                election_id,
                candidate_id,
            } => inner
                .registry
                .cast_vote(election_id, candidate_id, sender, now)?,
        };

        let tx = inner.mint_tx_ref();
        inner.consume_nonce(sender);
        if let Some(nonce) = nonce {
            inner.sequenced_nonces.push(nonce);
        }
        inner.include(tx, events);
        Ok(tx)
    }

    async fn await_inclusion(
        &self,
        tx: TxRef,
        _timeout: std::time::Duration,
    ) -> Result<TxRecord, RelayerError> {
        // Inclusion is instant here; a missing receipt is a timed-out wait.
        match self.inner.lock().await.receipts.get(&tx) {
            Some(record) => Ok(record.clone()),
            None => Err(RelayerError::ConfirmationTimeout(tx)),
        }
    }

    async fn receipt(&self, tx: TxRef) -> Result<Option<TxRecord>, RelayerError> {
        Ok(self.inner.lock().await.receipts.get(&tx).cloned())
    }

    async fn voter_status(
        &self,
        election_id: u64,
        voter: Address,
    ) -> Result<VoterStatus, RelayerError> {
        Ok(self
            .inner
            .lock()
            .await
            .registry
            .voter_status(election_id, voter)?)
    }

    async fn results(&self, election_id: u64) -> Result<ElectionResults, RelayerError> {
        Ok(self.inner.lock().await.registry.results(election_id)?)
    }
}
