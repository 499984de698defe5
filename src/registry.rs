// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Election registry state machine.
//!
//! The authoritative transition rules for elections, candidates,
//! registrations and tallies. The deployed registry contract executes the
//! same rules ledger-side; this module is the canonical Rust expression of
//! them and backs the in-process ledger (`sim::InMemoryLedger`).
//!
//! The registry is passive: there is no background timer. An election's
//! phase is computed against a caller-supplied `now` at read and vote time.
//!
//! Policy resolutions (see DESIGN.md):
//! - The manual `active` flag strictly overrides the time window. An
//!   operator-deactivated election is never votable, whatever the clock says.
//! - Candidate lists lock at the first cast vote (`CandidateListLocked`).

use std::collections::BTreeMap;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::ledger::RegistryEvent;
use crate::models::{CandidateResult, ElectionResults, VoterStatus};

/// Policy rejections emitted by the registry. Stable and machine-readable;
/// the pipeline maps these without touching message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum RegistryRejection {
    #[error("election does not exist")]
    UnknownElection,

    #[error("election is not active")]
    ElectionNotActive,

    #[error("voter is not registered for this election")]
    NotRegistered,

    #[error("voter is already registered for this election")]
    AlreadyRegistered,

    #[error("voter has already cast a vote in this election")]
    AlreadyVoted,

    #[error("candidate does not exist in this election")]
    InvalidCandidate,

    #[error("candidate list is locked once voting has begun")]
    CandidateListLocked,

    #[error("election end time must be after its start and in the future")]
    InvalidSchedule,
}

/// Lifecycle phase of an election at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionPhase {
    /// Before the start time.
    Draft,
    /// Inside the voting window.
    Active,
    /// Past the end time.
    Ended,
}

/// Registration record for one (election, voter) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Registration {
    has_voted: bool,
    candidate_id: Option<u64>,
}

/// One candidate. `vote_count` is mutated only by successful `cast_vote`
/// transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub id: u64,
    pub name: String,
    pub party: String,
    pub image_ref: String,
    pub vote_count: u64,
}

/// One election. The id is assigned at creation and never changes; elections
/// are deactivated, never deleted.
#[derive(Debug, Clone)]
pub struct ElectionRecord {
    pub id: u64,
    pub title: String,
    pub description: String,
    /// Unix seconds.
    pub start_time: u64,
    /// Unix seconds, strictly after `start_time`.
    pub end_time: u64,
    /// Operator-controlled flag. Overrides the time window when false.
    pub active: bool,
    candidates: Vec<CandidateRecord>,
    registrations: BTreeMap<Address, Registration>,
    total_votes: u64,
}

impl ElectionRecord {
    /// Phase from the time window alone; the `active` flag is applied by
    /// `is_votable`.
    pub fn phase(&self, now: u64) -> ElectionPhase {
        if now < self.start_time {
            ElectionPhase::Draft
        } else if now > self.end_time {
            ElectionPhase::Ended
        } else {
            ElectionPhase::Active
        }
    }

    /// Votable iff inside the window and not operator-deactivated.
    pub fn is_votable(&self, now: u64) -> bool {
        self.active && self.phase(now) == ElectionPhase::Active
    }

    pub fn candidates(&self) -> &[CandidateRecord] {
        &self.candidates
    }

    pub fn total_votes(&self) -> u64 {
        self.total_votes
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }
}

/// The full registry: all elections, keyed by their assigned id.
#[derive(Debug, Default)]
pub struct RegistryState {
    elections: BTreeMap<u64, ElectionRecord>,
    next_election_id: u64,
}

impl RegistryState {
    pub fn new() -> Self {
        RegistryState::default()
    }

    /// Create an election and assign the next 1-based id.
    ///
    /// Rejects schedules whose end is not strictly after both the start time
    /// and `now`.
    pub fn create_election(
        &mut self,
        title: &str,
        description: &str,
        start_time: u64,
        end_time: u64,
        now: u64,
    ) -> Result<(u64, Vec<RegistryEvent>), RegistryRejection> {
        if end_time <= start_time || end_time <= now {
            return Err(RegistryRejection::InvalidSchedule);
        }

        let id = self.next_election_id + 1;
        self.next_election_id = id;
        self.elections.insert(
            id,
            ElectionRecord {
                id,
                title: title.to_string(),
                description: description.to_string(),
                start_time,
                end_time,
                active: true,
                candidates: Vec::new(),
                registrations: BTreeMap::new(),
                total_votes: 0,
            },
        );

        Ok((
            id,
            vec![RegistryEvent::ElectionCreated {
                election_id: id,
                title: title.to_string(),
                start_time,
                end_time,
            }],
        ))
    }

    /// Add a candidate and assign the next 1-based per-election id. The
    /// list locks once the first vote lands.
    pub fn add_candidate(
        &mut self,
        election_id: u64,
        name: &str,
        party: &str,
        image_ref: &str,
    ) -> Result<(u64, Vec<RegistryEvent>), RegistryRejection> {
        let election = self.election_mut(election_id)?;
        if election.total_votes > 0 {
            return Err(RegistryRejection::CandidateListLocked);
        }

        let id = election.candidates.len() as u64 + 1;
        election.candidates.push(CandidateRecord {
            id,
            name: name.to_string(),
            party: party.to_string(),
            image_ref: image_ref.to_string(),
            vote_count: 0,
        });

        Ok((
            id,
            vec![RegistryEvent::CandidateAdded {
                election_id,
                candidate_id: id,
                name: name.to_string(),
                party: party.to_string(),
            }],
        ))
    }

    /// Register a voter. At most one registration per (election, voter);
    /// a duplicate is rejected and leaves state unchanged.
    pub fn register_voter(
        &mut self,
        election_id: u64,
        voter: Address,
    ) -> Result<Vec<RegistryEvent>, RegistryRejection> {
        let election = self.election_mut(election_id)?;
        if election.registrations.contains_key(&voter) {
            return Err(RegistryRejection::AlreadyRegistered);
        }

        election.registrations.insert(
            voter,
            Registration {
                has_voted: false,
                candidate_id: None,
            },
        );

        Ok(vec![RegistryEvent::VoterRegistered { election_id, voter }])
    }

    /// Toggle the operator `active` flag.
    pub fn set_active(
        &mut self,
        election_id: u64,
        active: bool,
    ) -> Result<Vec<RegistryEvent>, RegistryRejection> {
        let election = self.election_mut(election_id)?;
        election.active = active;
        Ok(vec![RegistryEvent::ElectionStatusChanged { election_id, active }])
    }

    /// Cast a vote.
    ///
    /// Requires a registration with `has_voted == false`, an existing
    /// candidate, and a votable election at `now`. On success the
    /// registration flips to voted, the chosen candidate is recorded, and
    /// both the candidate count and the election total increment - one
    /// atomic transition.
    pub fn cast_vote(
        &mut self,
        election_id: u64,
        candidate_id: u64,
        voter: Address,
        now: u64,
    ) -> Result<Vec<RegistryEvent>, RegistryRejection> {
        let election = self.election_mut(election_id)?;
        if !election.is_votable(now) {
            return Err(RegistryRejection::ElectionNotActive);
        }

        let registration = election
            .registrations
            .get(&voter)
            .copied()
            .ok_or(RegistryRejection::NotRegistered)?;
        if registration.has_voted {
            return Err(RegistryRejection::AlreadyVoted);
        }

        let candidate = election
            .candidates
            .iter_mut()
            .find(|c| c.id == candidate_id)
            .ok_or(RegistryRejection::InvalidCandidate)?;

        candidate.vote_count += 1;
        election.total_votes += 1;
        election.registrations.insert(
            voter,
            Registration {
                has_voted: true,
                candidate_id: Some(candidate_id),
            },
        );

        Ok(vec![RegistryEvent::VoteCast {
            election_id,
            candidate_id,
            voter,
        }])
    }

    /// Registration state for one (election, voter) pair. An unknown voter
    /// in a known election reads as unregistered.
    pub fn voter_status(
        &self,
        election_id: u64,
        voter: Address,
    ) -> Result<VoterStatus, RegistryRejection> {
        let election = self.election(election_id)?;
        Ok(match election.registrations.get(&voter) {
            None => VoterStatus::unregistered(),
            Some(r) => VoterStatus {
                registered: true,
                has_voted: r.has_voted,
                voted_candidate_id: r.candidate_id,
            },
        })
    }

    /// Candidate tallies and total for one election.
    pub fn results(&self, election_id: u64) -> Result<ElectionResults, RegistryRejection> {
        let election = self.election(election_id)?;
        Ok(ElectionResults {
            election_id,
            candidates: election
                .candidates
                .iter()
                .map(|c| CandidateResult {
                    id: c.id,
                    name: c.name.clone(),
                    party: c.party.clone(),
                    vote_count: c.vote_count,
                })
                .collect(),
            total_votes: election.total_votes,
        })
    }

    pub fn election(&self, election_id: u64) -> Result<&ElectionRecord, RegistryRejection> {
        self.elections
            .get(&election_id)
            .ok_or(RegistryRejection::UnknownElection)
    }

    fn election_mut(
        &mut self,
        election_id: u64,
    ) -> Result<&mut ElectionRecord, RegistryRejection> {
        self.elections
            .get_mut(&election_id)
            .ok_or(RegistryRejection::UnknownElection)
    }
}
