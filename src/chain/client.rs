// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM implementation of the ledger seam.
//!
//! Thin, stateless wrapper around the chain RPC: reads, signed submissions,
//! bounded inclusion waits, and typed registry state reads. All sequencing
//! policy lives above this layer; every call here stands alone.
//!
//! Fee policy: `max_fee = 2 * base_fee + priority`, where `priority` is the
//! network's reported baseline plus a fixed configured margin. A retry bump
//! doubles the priority fee. The doubled base-fee headroom absorbs base-fee
//! growth between estimation and inclusion.

use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::TransportError;

use super::contract::{self, IElectionRegistry};
use crate::error::RelayerError;
use crate::ledger::{Ledger, RegistryCall, TxRecord, TxRef};
use crate::models::{CandidateResult, ElectionResults, VoterStatus};

/// How often a bounded inclusion wait polls for a receipt.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Fallback base fee when the latest block carries none (25 gwei).
const FALLBACK_BASE_FEE: u128 = 25_000_000_000;

/// EVM-backed [`Ledger`].
pub struct EvmLedger {
    rpc_url: url::Url,
    registry: Address,
    priority_fee_margin: u128,
}

impl EvmLedger {
    pub fn new(
        rpc_url: &str,
        registry: Address,
        priority_fee_margin: u128,
    ) -> Result<Self, RelayerError> {
        let rpc_url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| RelayerError::InvalidInput(format!("bad RPC URL: {e}")))?;
        Ok(EvmLedger {
            rpc_url,
            registry,
            priority_fee_margin,
        })
    }

    /// Read-only provider.
    fn provider(&self) -> impl Provider + Clone {
        ProviderBuilder::new().connect_http(self.rpc_url.clone())
    }

    /// Provider that signs with `signer`. Built per submission: voter
    /// identities change per call, and the builder is cheap next to the RPC
    /// round-trips that follow.
    fn signing_provider(&self, signer: &PrivateKeySigner) -> impl Provider + Clone {
        ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer.clone()))
            .connect_http(self.rpc_url.clone())
    }

    /// Current (max_fee, priority_fee) under the fee-bump policy.
    async fn gas_prices(&self, bump: bool) -> Result<(u128, u128), RelayerError> {
        let provider = self.provider();

        let block = provider
            .get_block_by_number(alloy::eips::BlockNumberOrTag::Latest)
            .await
            .map_err(|e| RelayerError::Rpc(format!("failed to get latest block: {e}")))?
            .ok_or_else(|| RelayerError::Rpc("no latest block".to_string()))?;
        let base_fee: u128 = block
            .header
            .base_fee_per_gas
            .map(|f| f as u128)
            .unwrap_or(FALLBACK_BASE_FEE);

        let baseline = provider
            .get_max_priority_fee_per_gas()
            .await
            .unwrap_or(self.priority_fee_margin);

        let mut priority = baseline.saturating_add(self.priority_fee_margin);
        if bump {
            priority = priority.saturating_mul(2);
        }
        let max_fee = base_fee.saturating_mul(2).saturating_add(priority);
        Ok((max_fee, priority))
    }

    async fn send(
        &self,
        signer: &PrivateKeySigner,
        tx: TransactionRequest,
    ) -> Result<TxRef, RelayerError> {
        let provider = self.signing_provider(signer);
        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(classify_send_error)?;
        Ok(TxRef(*pending.tx_hash()))
    }

    fn record_from_receipt(
        &self,
        receipt: alloy::rpc::types::TransactionReceipt,
    ) -> Result<TxRecord, RelayerError> {
        let success = receipt.status();
        // Failed transactions emit nothing worth decoding.
        let events = if success {
            contract::decode_events(self.registry, receipt.logs())?
        } else {
            Vec::new()
        };
        Ok(TxRecord {
            tx_ref: TxRef(receipt.transaction_hash),
            block_number: receipt.block_number.unwrap_or(0),
            success,
            events,
        })
    }
}

impl Ledger for EvmLedger {
    async fn native_balance(&self, address: Address) -> Result<U256, RelayerError> {
        self.provider()
            .get_balance(address)
            .await
            .map_err(|e| RelayerError::Rpc(e.to_string()))
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, RelayerError> {
        self.provider()
            .get_transaction_count(address)
            .await
            .map_err(|e| RelayerError::Rpc(e.to_string()))
    }

    async fn transfer(
        &self,
        from: &PrivateKeySigner,
        to: Address,
        amount: U256,
        nonce: u64,
        bump_fee: bool,
    ) -> Result<TxRef, RelayerError> {
        let (max_fee, priority) = self.gas_prices(bump_fee).await?;
        let tx = TransactionRequest::default()
            .to(to)
            .value(amount)
            .nonce(nonce)
            .max_fee_per_gas(max_fee)
            .max_priority_fee_per_gas(priority);
        self.send(from, tx).await
    }

    async fn submit(
        &self,
        signer: &PrivateKeySigner,
        call: &RegistryCall,
        nonce: Option<u64>,
    ) -> Result<TxRef, RelayerError> {
        let (max_fee, priority) = self.gas_prices(false).await?;
        let mut tx = TransactionRequest::default()
            .to(self.registry)
            .input(contract::encode_call(call).into())
            .max_fee_per_gas(max_fee)
            .max_priority_fee_per_gas(priority);
        if let Some(nonce) = nonce {
            tx = tx.nonce(nonce);
        }

        tracing::debug!(op = call.op_name(), signer = %signer.address(), "submitting registry call");
        self.send(signer, tx).await
    }

    async fn await_inclusion(&self, tx: TxRef, timeout: Duration) -> Result<TxRecord, RelayerError> {
        let provider = self.provider();

        let wait = async {
            loop {
                let found = provider
                    .get_transaction_receipt(tx.0)
                    .await
                    .map_err(|e| RelayerError::Rpc(format!("failed to get receipt: {e}")))?;
                if let Some(receipt) = found {
                    return self.record_from_receipt(receipt);
                }
                tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            // The transaction is not un-submitted by giving up the wait; it
            // may still be included later.
            Err(_elapsed) => Err(RelayerError::ConfirmationTimeout(tx)),
        }
    }

    async fn receipt(&self, tx: TxRef) -> Result<Option<TxRecord>, RelayerError> {
        let found = self
            .provider()
            .get_transaction_receipt(tx.0)
            .await
            .map_err(|e| RelayerError::Rpc(format!("failed to get receipt: {e}")))?;
        found.map(|r| self.record_from_receipt(r)).transpose()
    }

    async fn voter_status(
        &self,
        election_id: u64,
        voter: Address,
    ) -> Result<VoterStatus, RelayerError> {
        let provider = self.provider();
        let registry = IElectionRegistry::new(self.registry, provider);

        let status = registry
            .getVoterStatus(U256::from(election_id), voter)
            .call()
            .await
            .map_err(classify_contract_error)?;

        Ok(VoterStatus {
            registered: status.registered,
            has_voted: status.hasVoted,
            voted_candidate_id: if status.hasVoted {
                Some(u64::try_from(status.candidateId).map_err(|_| {
                    RelayerError::EventDecode("candidateId overflows u64".to_string())
                })?)
            } else {
                None
            },
        })
    }

    async fn results(&self, election_id: u64) -> Result<ElectionResults, RelayerError> {
        let provider = self.provider();
        let registry = IElectionRegistry::new(self.registry, provider);

        let candidates = registry
            .getCandidates(U256::from(election_id))
            .call()
            .await
            .map_err(classify_contract_error)?;
        let total = registry
            .getTotalVotes(U256::from(election_id))
            .call()
            .await
            .map_err(classify_contract_error)?;

        let candidates = candidates
            .into_iter()
            .map(|c| {
                Ok(CandidateResult {
                    id: u64::try_from(c.id).map_err(|_| {
                        RelayerError::EventDecode("candidate id overflows u64".to_string())
                    })?,
                    name: c.name,
                    party: c.party,
                    vote_count: u64::try_from(c.voteCount).map_err(|_| {
                        RelayerError::EventDecode("vote count overflows u64".to_string())
                    })?,
                })
            })
            .collect::<Result<Vec<_>, RelayerError>>()?;

        Ok(ElectionResults {
            election_id,
            candidates,
            total_votes: u64::try_from(total)
                .map_err(|_| RelayerError::EventDecode("total votes overflows u64".to_string()))?,
        })
    }
}

/// Classify a send-path RPC failure.
///
/// A node error response with registry revert data is a policy rejection; any
/// other error response is a rejected submission; transport failures are
/// plain RPC errors.
fn classify_send_error(err: TransportError) -> RelayerError {
    if let Some(resp) = err.as_error_resp() {
        if let Some(data) = resp.as_revert_data() {
            if let Some(rejection) = contract::decode_revert(&data) {
                return rejection.into();
            }
        }
        return RelayerError::SubmissionRejected(resp.message.to_string());
    }
    RelayerError::Rpc(err.to_string())
}

/// Classify a read-path contract call failure the same way.
fn classify_contract_error(err: alloy::contract::Error) -> RelayerError {
    if let alloy::contract::Error::TransportError(transport) = err {
        return classify_send_error(transport);
    }
    RelayerError::Rpc(err.to_string())
}
