// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end relayer flows over the in-process ledger.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use alloy::signers::local::PrivateKeySigner;
use chrono::{DateTime, TimeZone, Utc};

use ballot_relayer::sim::InMemoryLedger;
use ballot_relayer::{
    FundingManager, IdentityDeriver, RegistryRejection, RelayerError, TransactionPipeline,
    VoteProof,
};

const ETH: u128 = 1_000_000_000_000_000_000;

fn operator() -> PrivateKeySigner {
    let mut key = [0u8; 32];
    key[31] = 0x42;
    PrivateKeySigner::from_slice(&key).unwrap()
}

fn window() -> (DateTime<Utc>, DateTime<Utc>) {
    let now = InMemoryLedger::DEFAULT_NOW as i64;
    (
        Utc.timestamp_opt(now - 10, 0).unwrap(),
        Utc.timestamp_opt(now + 3600, 0).unwrap(),
    )
}

async fn pipeline() -> (Arc<InMemoryLedger>, TransactionPipeline<InMemoryLedger>) {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit(operator().address(), U256::from(100 * ETH)).await;

    let funding = Arc::new(FundingManager::new(
        ledger.clone(),
        operator(),
        U256::from(ETH / 100),
        U256::from(ETH / 50),
        Duration::from_secs(5),
    ));
    let pipeline = TransactionPipeline::new(
        ledger.clone(),
        funding,
        IdentityDeriver::new("integration-secret"),
        Duration::from_secs(5),
        None,
    );
    (ledger, pipeline)
}

#[tokio::test]
async fn full_election_lifecycle() {
    let (_ledger, pipeline) = pipeline().await;
    let (start, end) = window();

    let election = pipeline
        .create_election("Board 2026", "Annual board vote", start, end)
        .await
        .unwrap();
    assert_eq!(election.election_id, 1);

    let a = pipeline
        .add_candidate(election.election_id, "A", "PartyX", "a.png")
        .await
        .unwrap();
    assert_eq!(a.candidate_id, 1);
    let b = pipeline
        .add_candidate(election.election_id, "B", "PartyY", "b.png")
        .await
        .unwrap();
    assert_eq!(b.candidate_id, 2);

    let addr1 = pipeline.voter_address("user-1").unwrap();
    pipeline
        .register_voter(election.election_id, addr1)
        .await
        .unwrap();

    let vote = pipeline
        .cast_vote(election.election_id, 1, "user-1")
        .await
        .unwrap();

    let results = pipeline.get_results(election.election_id).await.unwrap();
    assert_eq!(results.candidates[0].vote_count, 1);
    assert_eq!(results.candidates[1].vote_count, 0);
    assert_eq!(results.total_votes, 1);

    let status = pipeline
        .get_voter_status(election.election_id, addr1)
        .await
        .unwrap();
    assert!(status.registered && status.has_voted);
    assert_eq!(status.voted_candidate_id, Some(1));

    // The confirmed vote reconciles; a mismatched claim does not.
    assert!(pipeline
        .verify_vote_proof(&VoteProof {
            election_id: election.election_id,
            candidate_id: 1,
            voter: addr1,
            tx_ref: vote.tx_ref,
        })
        .await
        .unwrap());
    assert!(!pipeline
        .verify_vote_proof(&VoteProof {
            election_id: election.election_id,
            candidate_id: 2,
            voter: addr1,
            tx_ref: vote.tx_ref,
        })
        .await
        .unwrap());
}

#[tokio::test]
async fn duplicate_registration_leaves_exactly_one_record() {
    let (_ledger, pipeline) = pipeline().await;
    let (start, end) = window();

    let election = pipeline
        .create_election("Board", "", start, end)
        .await
        .unwrap()
        .election_id;
    let addr = pipeline.voter_address("user-1").unwrap();

    pipeline.register_voter(election, addr).await.unwrap();
    let err = pipeline.register_voter(election, addr).await.unwrap_err();
    assert!(matches!(
        err,
        RelayerError::Rejected(RegistryRejection::AlreadyRegistered)
    ));

    let status = pipeline.get_voter_status(election, addr).await.unwrap();
    assert!(status.registered && !status.has_voted);
}

#[tokio::test]
async fn unregistered_vote_is_rejected_without_mutation() {
    let (_ledger, pipeline) = pipeline().await;
    let (start, end) = window();

    let election = pipeline
        .create_election("Board", "", start, end)
        .await
        .unwrap()
        .election_id;
    pipeline.add_candidate(election, "A", "PartyX", "").await.unwrap();

    let err = pipeline.cast_vote(election, 1, "stranger").await.unwrap_err();
    assert!(matches!(
        err,
        RelayerError::Rejected(RegistryRejection::NotRegistered)
    ));
    assert_eq!(pipeline.get_results(election).await.unwrap().total_votes, 0);
}

#[tokio::test]
async fn each_voter_votes_at_most_once_under_concurrency() {
    let (_ledger, pipeline) = pipeline().await;
    let pipeline = Arc::new(pipeline);
    let (start, end) = window();

    let election = pipeline
        .create_election("Board", "", start, end)
        .await
        .unwrap()
        .election_id;
    pipeline.add_candidate(election, "A", "PartyX", "").await.unwrap();
    pipeline.add_candidate(election, "B", "PartyY", "").await.unwrap();

    let users: Vec<String> = (0..6).map(|n| format!("user-{n}")).collect();
    let addresses: Vec<_> = users
        .iter()
        .map(|u| pipeline.voter_address(u).unwrap())
        .collect();
    pipeline
        .batch_register_voters(election, &addresses)
        .await
        .unwrap();

    // Every voter double-submits the same vote concurrently. Exactly one
    // submission per voter may win.
    let mut handles = Vec::new();
    for (n, user) in users.iter().enumerate() {
        for _ in 0..2 {
            let pipeline = pipeline.clone();
            let user = user.clone();
            let candidate = (n as u64 % 2) + 1;
            handles.push(tokio::spawn(async move {
                pipeline.cast_vote(election, candidate, &user).await
            }));
        }
    }

    let mut accepted = 0;
    let mut already_voted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(RelayerError::Rejected(RegistryRejection::AlreadyVoted)) => already_voted += 1,
            Err(other) => panic!("unexpected outcome: {other}"),
        }
    }
    assert_eq!(accepted, 6);
    assert_eq!(already_voted, 6);

    let results = pipeline.get_results(election).await.unwrap();
    let sum: u64 = results.candidates.iter().map(|c| c.vote_count).sum();
    assert_eq!(sum, results.total_votes);
    assert_eq!(results.total_votes, 6);
}

#[tokio::test]
async fn deactivated_election_rejects_votes_even_inside_the_window() {
    let (_ledger, pipeline) = pipeline().await;
    let (start, end) = window();

    let election = pipeline
        .create_election("Board", "", start, end)
        .await
        .unwrap()
        .election_id;
    pipeline.add_candidate(election, "A", "PartyX", "").await.unwrap();
    let addr = pipeline.voter_address("user-1").unwrap();
    pipeline.register_voter(election, addr).await.unwrap();

    pipeline.set_election_active(election, false).await.unwrap();
    let err = pipeline.cast_vote(election, 1, "user-1").await.unwrap_err();
    assert!(matches!(
        err,
        RelayerError::Rejected(RegistryRejection::ElectionNotActive)
    ));

    pipeline.set_election_active(election, true).await.unwrap();
    pipeline.cast_vote(election, 1, "user-1").await.unwrap();
}

#[tokio::test]
async fn voting_after_the_window_is_rejected() {
    let (ledger, pipeline) = pipeline().await;
    let (start, end) = window();

    let election = pipeline
        .create_election("Board", "", start, end)
        .await
        .unwrap()
        .election_id;
    pipeline.add_candidate(election, "A", "PartyX", "").await.unwrap();
    let addr = pipeline.voter_address("user-1").unwrap();
    pipeline.register_voter(election, addr).await.unwrap();

    ledger.set_now(InMemoryLedger::DEFAULT_NOW + 100_000).await;
    let err = pipeline.cast_vote(election, 1, "user-1").await.unwrap_err();
    assert!(matches!(
        err,
        RelayerError::Rejected(RegistryRejection::ElectionNotActive)
    ));
}

#[tokio::test]
async fn no_cross_voter_proof_forgery() {
    let (_ledger, pipeline) = pipeline().await;
    let (start, end) = window();

    let election = pipeline
        .create_election("Board", "", start, end)
        .await
        .unwrap()
        .election_id;
    pipeline.add_candidate(election, "A", "PartyX", "").await.unwrap();

    let addr1 = pipeline.voter_address("user-1").unwrap();
    let addr2 = pipeline.voter_address("user-2").unwrap();
    pipeline
        .batch_register_voters(election, &[addr1, addr2])
        .await
        .unwrap();

    // Voter 1 actually votes; voter 2 claims voter 1's transaction.
    let vote = pipeline.cast_vote(election, 1, "user-1").await.unwrap();
    let forged = VoteProof {
        election_id: election,
        candidate_id: 1,
        voter: addr2,
        tx_ref: vote.tx_ref,
    };
    assert!(!pipeline.verify_vote_proof(&forged).await.unwrap());
}
