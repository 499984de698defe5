// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ballot Relayer - Custodial Election Relayer
//!
//! This crate lets voters act on an EVM-hosted election registry without
//! holding their own keys: it derives per-voter signing identities, funds
//! them from a single operator account, submits registration and vote
//! transactions on their behalf, and reconciles claimed vote proofs against
//! the chain before any off-chain tally is trusted.
//!
//! ## Modules
//!
//! - `pipeline` - the operations exposed to collaborators
//! - `funding` - operator account funding and nonce sequencing
//! - `identity` - deterministic per-voter signing identities
//! - `reconcile` - vote proof verification
//! - `registry` - the election registry state machine
//! - `chain` - EVM integration (alloy)
//! - `sim` - in-process ledger for tests and local development

pub mod chain;
pub mod config;
pub mod error;
pub mod funding;
pub mod identity;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod registry;
pub mod sim;

pub use config::RelayerConfig;
pub use error::RelayerError;
pub use funding::FundingManager;
pub use identity::IdentityDeriver;
pub use ledger::{Ledger, RegistryCall, RegistryEvent, TxRecord, TxRef};
pub use models::{
    AddedCandidate, CandidateResult, CreatedElection, ElectionResults, TxOutcome, VoteProof,
    VoterStatus,
};
pub use pipeline::TransactionPipeline;
pub use reconcile::VoteReconciler;
pub use registry::{ElectionPhase, RegistryRejection, RegistryState};
