// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction pipeline: the operations exposed to collaborators.
//!
//! Each operation builds a registry call, signs it with the right identity
//! (operator for administrative calls, derived voter identity for
//! `cast_vote`), submits it, waits for inclusion, and decodes the receipt's
//! events where the ledger assigns an identifier.
//!
//! Operator-signed calls go through the funding manager's sequencer, since
//! they spend the same account's nonces as funding transfers. Confirmation
//! timeouts are surfaced, never auto-resubmitted: the transaction may still
//! land, and resubmitting a non-idempotent call risks duplicates.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};

use crate::error::RelayerError;
use crate::funding::FundingManager;
use crate::identity::IdentityDeriver;
use crate::ledger::{Ledger, RegistryCall, RegistryEvent, TxRecord};
use crate::models::{
    AddedCandidate, CreatedElection, ElectionResults, TxOutcome, VoteProof, VoterStatus,
};
use crate::reconcile::VoteReconciler;

/// Sequences election operations against the ledger.
pub struct TransactionPipeline<L: Ledger> {
    ledger: Arc<L>,
    funding: Arc<FundingManager<L>>,
    identities: IdentityDeriver,
    reconciler: VoteReconciler<L>,
    confirmation_timeout: Duration,
    explorer_url: Option<String>,
}

impl<L: Ledger> TransactionPipeline<L> {
    pub fn new(
        ledger: Arc<L>,
        funding: Arc<FundingManager<L>>,
        identities: IdentityDeriver,
        confirmation_timeout: Duration,
        explorer_url: Option<String>,
    ) -> Self {
        let reconciler = VoteReconciler::new(ledger.clone());
        TransactionPipeline {
            ledger,
            funding,
            identities,
            reconciler,
            confirmation_timeout,
            explorer_url,
        }
    }

    /// Public address of the operator identity.
    pub fn operator_address(&self) -> Address {
        self.funding.operator_address()
    }

    /// Create an election. The ledger assigns the election id; it is
    /// recovered from the receipt's `ElectionCreated` event, never inferred.
    pub async fn create_election(
        &self,
        title: &str,
        description: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CreatedElection, RelayerError> {
        if title.trim().is_empty() {
            return Err(RelayerError::InvalidInput(
                "election title must not be empty".to_string(),
            ));
        }
        if end <= start {
            return Err(RelayerError::InvalidInput(
                "election end must be after its start".to_string(),
            ));
        }

        let record = self
            .funding
            .submit_operator_call(&RegistryCall::CreateElection {
                title: title.to_string(),
                description: description.to_string(),
                start_time: unix_seconds(start)?,
                end_time: unix_seconds(end)?,
            })
            .await?;

        let election_id = record
            .events
            .iter()
            .find_map(|event| match event {
                RegistryEvent::ElectionCreated { election_id, .. } => Some(*election_id),
                _ => None,
            })
            .ok_or_else(|| {
                RelayerError::EventDecode(format!(
                    "createElection receipt {} carries no ElectionCreated event",
                    record.tx_ref
                ))
            })?;

        tracing::info!(election_id, tx = %record.tx_ref, title, "election created");
        Ok(CreatedElection {
            election_id,
            outcome: self.outcome(&record),
        })
    }

    /// Add a candidate. The per-election candidate id comes from the
    /// receipt's `CandidateAdded` event.
    pub async fn add_candidate(
        &self,
        election_id: u64,
        name: &str,
        party: &str,
        image_ref: &str,
    ) -> Result<AddedCandidate, RelayerError> {
        if name.trim().is_empty() {
            return Err(RelayerError::InvalidInput(
                "candidate name must not be empty".to_string(),
            ));
        }

        let record = self
            .funding
            .submit_operator_call(&RegistryCall::AddCandidate {
                election_id,
                name: name.to_string(),
                party: party.to_string(),
                image_ref: image_ref.to_string(),
            })
            .await?;

        let candidate_id = record
            .events
            .iter()
            .find_map(|event| match event {
                RegistryEvent::CandidateAdded { candidate_id, .. } => Some(*candidate_id),
                _ => None,
            })
            .ok_or_else(|| {
                RelayerError::EventDecode(format!(
                    "addCandidate receipt {} carries no CandidateAdded event",
                    record.tx_ref
                ))
            })?;

        tracing::info!(election_id, candidate_id, tx = %record.tx_ref, "candidate added");
        Ok(AddedCandidate {
            election_id,
            candidate_id,
            outcome: self.outcome(&record),
        })
    }

    /// Register one voter address for an election.
    pub async fn register_voter(
        &self,
        election_id: u64,
        voter: Address,
    ) -> Result<TxOutcome, RelayerError> {
        let record = self
            .funding
            .submit_operator_call(&RegistryCall::RegisterVoter { election_id, voter })
            .await?;
        tracing::info!(election_id, %voter, tx = %record.tx_ref, "voter registered");
        Ok(self.outcome(&record))
    }

    /// Register a batch of voter addresses in one transaction.
    pub async fn batch_register_voters(
        &self,
        election_id: u64,
        voters: &[Address],
    ) -> Result<TxOutcome, RelayerError> {
        if voters.is_empty() {
            return Err(RelayerError::InvalidInput(
                "voter batch must not be empty".to_string(),
            ));
        }

        let record = self
            .funding
            .submit_operator_call(&RegistryCall::BatchRegisterVoters {
                election_id,
                voters: voters.to_vec(),
            })
            .await?;
        tracing::info!(
            election_id,
            count = voters.len(),
            tx = %record.tx_ref,
            "voter batch registered"
        );
        Ok(self.outcome(&record))
    }

    /// Toggle the operator `active` flag on an election.
    pub async fn set_election_active(
        &self,
        election_id: u64,
        active: bool,
    ) -> Result<TxOutcome, RelayerError> {
        let record = self
            .funding
            .submit_operator_call(&RegistryCall::SetElectionActive { election_id, active })
            .await?;
        tracing::info!(election_id, active, tx = %record.tx_ref, "election status changed");
        Ok(self.outcome(&record))
    }

    /// Cast a vote on behalf of a voter.
    ///
    /// Derives the voter's signing identity, pre-flight-checks registration
    /// state, tops up the voter account if needed, submits with the voter
    /// signer, and confirms the receipt carries the matching `VoteCast`
    /// event. The pre-flight is an optimization only: if two submissions
    /// race past it, the registry's own `AlreadyVoted` rejection is the
    /// final arbiter.
    pub async fn cast_vote(
        &self,
        election_id: u64,
        candidate_id: u64,
        voter_user_id: &str,
    ) -> Result<TxOutcome, RelayerError> {
        let signer = self.identities.derive(voter_user_id)?;
        let voter = signer.address();

        let status = self.ledger.voter_status(election_id, voter).await?;
        if !status.registered {
            return Err(crate::registry::RegistryRejection::NotRegistered.into());
        }
        if status.has_voted {
            return Err(crate::registry::RegistryRejection::AlreadyVoted.into());
        }

        self.funding.ensure_funded(voter).await?;

        let call = RegistryCall::CastVote {
            election_id,
            candidate_id,
        };
        let tx = self.ledger.submit(&signer, &call, None).await?;
        let record = self.ledger.await_inclusion(tx, self.confirmation_timeout).await?;
        if !record.success {
            return Err(RelayerError::TxReverted(tx));
        }

        let matched = record.events.iter().any(|event| {
            matches!(
                event,
                RegistryEvent::VoteCast {
                    election_id: e,
                    candidate_id: c,
                    voter: v,
                } if *e == election_id && *c == candidate_id && *v == voter
            )
        });
        if !matched {
            return Err(RelayerError::EventDecode(format!(
                "castVote receipt {tx} carries no matching VoteCast event"
            )));
        }

        tracing::info!(election_id, candidate_id, %voter, %tx, "vote cast");
        Ok(self.outcome(&record))
    }

    /// Verify a client-claimed vote proof against the ledger. Returns
    /// `false` for any proof the reconciler rejects; infrastructure errors
    /// still propagate, since they mean "could not verify", not "forged".
    pub async fn verify_vote_proof(&self, proof: &VoteProof) -> Result<bool, RelayerError> {
        match self.reconciler.verify(proof).await {
            Ok(()) => Ok(true),
            Err(
                RelayerError::ProofNotFound(_)
                | RelayerError::ProofTxFailed(_)
                | RelayerError::ProofMismatch(_),
            ) => Ok(false),
            Err(other) => Err(other),
        }
    }

    /// Candidate tallies and total for an election.
    pub async fn get_results(&self, election_id: u64) -> Result<ElectionResults, RelayerError> {
        self.ledger.results(election_id).await
    }

    /// Registration and voting state for one (election, voter) pair.
    pub async fn get_voter_status(
        &self,
        election_id: u64,
        voter: Address,
    ) -> Result<VoterStatus, RelayerError> {
        self.ledger.voter_status(election_id, voter).await
    }

    /// Public address of a voter's derived identity - the join key against
    /// on-chain registrations.
    pub fn voter_address(&self, voter_user_id: &str) -> Result<Address, RelayerError> {
        self.identities.address_for(voter_user_id)
    }

    fn outcome(&self, record: &TxRecord) -> TxOutcome {
        TxOutcome {
            tx_ref: record.tx_ref,
            explorer_url: self
                .explorer_url
                .as_ref()
                .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), record.tx_ref)),
        }
    }
}

impl TransactionPipeline<crate::chain::EvmLedger> {
    /// Wire a production pipeline from configuration: EVM ledger, operator
    /// signer, funding manager and identity deriver.
    pub fn from_config(config: &crate::config::RelayerConfig) -> Result<Self, RelayerError> {
        let ledger = Arc::new(crate::chain::EvmLedger::new(
            &config.rpc_url,
            config.registry_address,
            config.priority_fee_margin,
        )?);
        let operator = crate::identity::signer_from_hex(&config.operator_key_hex)?;
        let funding = Arc::new(FundingManager::new(
            ledger.clone(),
            operator,
            config.min_voter_balance,
            config.top_up_amount,
            config.confirmation_timeout,
        ));
        Ok(TransactionPipeline::new(
            ledger,
            funding,
            IdentityDeriver::new(config.identity_secret.as_bytes()),
            config.confirmation_timeout,
            config.explorer_url.clone(),
        ))
    }
}

fn unix_seconds(at: DateTime<Utc>) -> Result<u64, RelayerError> {
    u64::try_from(at.timestamp())
        .map_err(|_| RelayerError::InvalidInput("timestamps before 1970 are not valid".to_string()))
}
