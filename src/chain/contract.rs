// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Election registry contract binding.
//!
//! The ABI surface of the deployed registry, plus the two fallible decode
//! steps the relayer depends on:
//!
//! - receipt logs -> typed [`RegistryEvent`]s. Decoding fails closed: a log
//!   from the registry address whose topic or payload this build does not
//!   recognize is a protocol error, not something to skip.
//! - revert data -> [`RegistryRejection`]. Policy rejections travel as
//!   typed custom errors, never as message text.

use alloy::primitives::{Address, U256};
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent, SolInterface};

use crate::error::RelayerError;
use crate::ledger::{RegistryCall, RegistryEvent};
use crate::registry::RegistryRejection;

sol! {
    #[sol(rpc)]
    interface IElectionRegistry {
        struct CandidateView {
            uint256 id;
            string name;
            string party;
            string imageRef;
            uint256 voteCount;
        }

        event ElectionCreated(uint256 indexed electionId, string title, uint256 startTime, uint256 endTime);
        event CandidateAdded(uint256 indexed electionId, uint256 indexed candidateId, string name, string party);
        event VoterRegistered(uint256 indexed electionId, address indexed voter);
        event VoteCast(uint256 indexed electionId, uint256 indexed candidateId, address indexed voter);
        event ElectionStatusChanged(uint256 indexed electionId, bool active);

        error UnknownElection();
        error ElectionNotActive();
        error NotRegistered();
        error AlreadyRegistered();
        error AlreadyVoted();
        error InvalidCandidate();
        error CandidateListLocked();
        error InvalidSchedule();

        function createElection(string calldata title, string calldata description, uint256 startTime, uint256 endTime) external returns (uint256 electionId);
        function addCandidate(uint256 electionId, string calldata name, string calldata party, string calldata imageRef) external returns (uint256 candidateId);
        function registerVoter(uint256 electionId, address voter) external;
        function batchRegisterVoters(uint256 electionId, address[] calldata voters) external;
        function setElectionActive(uint256 electionId, bool active) external;
        function castVote(uint256 electionId, uint256 candidateId) external;

        function getCandidates(uint256 electionId) external view returns (CandidateView[] memory);
        function getVoterStatus(uint256 electionId, address voter) external view returns (bool registered, bool hasVoted, uint256 candidateId);
        function getTotalVotes(uint256 electionId) external view returns (uint256);
    }
}

/// ABI-encode a registry call for submission.
pub fn encode_call(call: &RegistryCall) -> Vec<u8> {
    match call {
        RegistryCall::CreateElection {
            title,
            description,
            start_time,
            end_time,
        } => IElectionRegistry::createElectionCall {
            title: title.clone(),
            description: description.clone(),
            startTime: U256::from(*start_time),
            endTime: U256::from(*end_time),
        }
        .abi_encode(),
        RegistryCall::AddCandidate {
            election_id,
            name,
            party,
            image_ref,
        } => IElectionRegistry::addCandidateCall {
            electionId: U256::from(*election_id),
            name: name.clone(),
            party: party.clone(),
            imageRef: image_ref.clone(),
        }
        .abi_encode(),
        RegistryCall::RegisterVoter { election_id, voter } => {
            IElectionRegistry::registerVoterCall {
                electionId: U256::from(*election_id),
                voter: *voter,
            }
            .abi_encode()
        }
        RegistryCall::BatchRegisterVoters { election_id, voters } => {
            IElectionRegistry::batchRegisterVotersCall {
                electionId: U256::from(*election_id),
                voters: voters.clone(),
            }
            .abi_encode()
        }
        RegistryCall::SetElectionActive {
            election_id,
            active,
        } => IElectionRegistry::setElectionActiveCall {
            electionId: U256::from(*election_id),
            active: *active,
        }
        .abi_encode(),
        RegistryCall::CastVote {
            election_id,
            candidate_id,
        } => IElectionRegistry::castVoteCall {
            electionId: U256::from(*election_id),
            candidateId: U256::from(*candidate_id),
        }
        .abi_encode(),
    }
}

/// Decode the registry events in a receipt's logs.
///
/// Logs emitted by other contracts are ignored; a registry-address log this
/// build cannot decode fails the whole receipt with a protocol error.
pub fn decode_events(registry: Address, logs: &[Log]) -> Result<Vec<RegistryEvent>, RelayerError> {
    let mut events = Vec::new();

    for log in logs {
        if log.address() != registry {
            continue;
        }

        let topic0 = log.topic0().ok_or_else(|| {
            RelayerError::EventDecode("registry log without a topic".to_string())
        })?;

        let event = if *topic0 == IElectionRegistry::ElectionCreated::SIGNATURE_HASH {
            let decoded = decode_log::<IElectionRegistry::ElectionCreated>(log)?;
            RegistryEvent::ElectionCreated {
                election_id: event_id(decoded.electionId, "electionId")?,
                title: decoded.title,
                start_time: event_id(decoded.startTime, "startTime")?,
                end_time: event_id(decoded.endTime, "endTime")?,
            }
        } else if *topic0 == IElectionRegistry::CandidateAdded::SIGNATURE_HASH {
            let decoded = decode_log::<IElectionRegistry::CandidateAdded>(log)?;
            RegistryEvent::CandidateAdded {
                election_id: event_id(decoded.electionId, "electionId")?,
                candidate_id: event_id(decoded.candidateId, "candidateId")?,
                name: decoded.name,
                party: decoded.party,
            }
        } else if *topic0 == IElectionRegistry::VoterRegistered::SIGNATURE_HASH {
            let decoded = decode_log::<IElectionRegistry::VoterRegistered>(log)?;
            RegistryEvent::VoterRegistered {
                election_id: event_id(decoded.electionId, "electionId")?,
                voter: decoded.voter,
            }
        } else if *topic0 == IElectionRegistry::VoteCast::SIGNATURE_HASH {
            let decoded = decode_log::<IElectionRegistry::VoteCast>(log)?;
            RegistryEvent::VoteCast {
                election_id: event_id(decoded.electionId, "electionId")?,
                candidate_id: event_id(decoded.candidateId, "candidateId")?,
                voter: decoded.voter,
            }
        } else if *topic0 == IElectionRegistry::ElectionStatusChanged::SIGNATURE_HASH {
            let decoded = decode_log::<IElectionRegistry::ElectionStatusChanged>(log)?;
            RegistryEvent::ElectionStatusChanged {
                election_id: event_id(decoded.electionId, "electionId")?,
                active: decoded.active,
            }
        } else {
            // Fail closed: an unknown registry event means the deployed
            // schema and this build have drifted apart.
            return Err(RelayerError::EventDecode(format!(
                "unrecognized registry event topic {topic0}"
            )));
        };

        events.push(event);
    }

    Ok(events)
}

/// Decode revert data into a policy rejection, if it is one of the
/// registry's typed errors.
pub fn decode_revert(data: &[u8]) -> Option<RegistryRejection> {
    use IElectionRegistry::IElectionRegistryErrors as Errors;

    match Errors::abi_decode(data).ok()? {
        Errors::UnknownElection(_) => Some(RegistryRejection::UnknownElection),
        Errors::ElectionNotActive(_) => Some(RegistryRejection::ElectionNotActive),
        Errors::NotRegistered(_) => Some(RegistryRejection::NotRegistered),
        Errors::AlreadyRegistered(_) => Some(RegistryRejection::AlreadyRegistered),
        Errors::AlreadyVoted(_) => Some(RegistryRejection::AlreadyVoted),
        Errors::InvalidCandidate(_) => Some(RegistryRejection::InvalidCandidate),
        Errors::CandidateListLocked(_) => Some(RegistryRejection::CandidateListLocked),
        Errors::InvalidSchedule(_) => Some(RegistryRejection::InvalidSchedule),
    }
}

fn decode_log<E: SolEvent>(log: &Log) -> Result<E, RelayerError> {
    log.log_decode::<E>()
        .map(|decoded| decoded.inner.data)
        .map_err(|e| RelayerError::EventDecode(format!("malformed registry event: {e}")))
}

fn event_id(value: U256, field: &str) -> Result<u64, RelayerError> {
    u64::try_from(value)
        .map_err(|_| RelayerError::EventDecode(format!("event field {field} overflows u64")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::LogData;
    use alloy::sol_types::SolError;

    fn registry() -> Address {
        Address::with_last_byte(0xEE)
    }

    fn wrap(address: Address, data: LogData) -> Log {
        Log {
            inner: alloy::primitives::Log { address, data },
            ..Log::default()
        }
    }

    #[test]
    fn vote_cast_event_decodes() {
        let voter = Address::with_last_byte(7);
        let raw = IElectionRegistry::VoteCast {
            electionId: U256::from(3u64),
            candidateId: U256::from(2u64),
            voter,
        };
        let log = wrap(registry(), raw.encode_log_data());

        let events = decode_events(registry(), &[log]).unwrap();
        assert_eq!(
            events,
            vec![RegistryEvent::VoteCast {
                election_id: 3,
                candidate_id: 2,
                voter,
            }]
        );
    }

    #[test]
    fn election_created_event_decodes() {
        let raw = IElectionRegistry::ElectionCreated {
            electionId: U256::from(1u64),
            title: "Board".to_string(),
            startTime: U256::from(100u64),
            endTime: U256::from(200u64),
        };
        let log = wrap(registry(), raw.encode_log_data());

        let events = decode_events(registry(), &[log]).unwrap();
        assert_eq!(
            events,
            vec![RegistryEvent::ElectionCreated {
                election_id: 1,
                title: "Board".to_string(),
                start_time: 100,
                end_time: 200,
            }]
        );
    }

    #[test]
    fn foreign_contract_logs_are_ignored() {
        let raw = IElectionRegistry::VoteCast {
            electionId: U256::from(1u64),
            candidateId: U256::from(1u64),
            voter: Address::with_last_byte(7),
        };
        let log = wrap(Address::with_last_byte(0x11), raw.encode_log_data());

        assert_eq!(decode_events(registry(), &[log]).unwrap(), vec![]);
    }

    #[test]
    fn unknown_registry_topic_fails_closed() {
        // A Transfer-shaped log from the registry address itself.
        sol! {
            interface IOther {
                event Transfer(address indexed from, address indexed to, uint256 value);
            }
        }
        let raw = IOther::Transfer {
            from: Address::with_last_byte(1),
            to: Address::with_last_byte(2),
            value: U256::from(5u64),
        };
        let log = wrap(registry(), raw.encode_log_data());

        let err = decode_events(registry(), &[log]).unwrap_err();
        assert!(matches!(err, RelayerError::EventDecode(_)));
    }

    #[test]
    fn revert_data_maps_to_policy_rejections() {
        let cases: Vec<(Vec<u8>, RegistryRejection)> = vec![
            (
                IElectionRegistry::AlreadyVoted {}.abi_encode(),
                RegistryRejection::AlreadyVoted,
            ),
            (
                IElectionRegistry::NotRegistered {}.abi_encode(),
                RegistryRejection::NotRegistered,
            ),
            (
                IElectionRegistry::InvalidCandidate {}.abi_encode(),
                RegistryRejection::InvalidCandidate,
            ),
            (
                IElectionRegistry::ElectionNotActive {}.abi_encode(),
                RegistryRejection::ElectionNotActive,
            ),
        ];
        for (data, expected) in cases {
            assert_eq!(decode_revert(&data), Some(expected));
        }
    }

    #[test]
    fn unknown_revert_data_is_not_a_policy_rejection() {
        assert_eq!(decode_revert(&[0xde, 0xad, 0xbe, 0xef]), None);
        assert_eq!(decode_revert(&[]), None);
    }

    #[test]
    fn calls_encode_with_their_selectors() {
        let call = RegistryCall::CastVote {
            election_id: 1,
            candidate_id: 2,
        };
        let encoded = encode_call(&call);
        assert_eq!(&encoded[..4], IElectionRegistry::castVoteCall::SELECTOR);

        let call = RegistryCall::CreateElection {
            title: "X".into(),
            description: String::new(),
            start_time: 1,
            end_time: 2,
        };
        let encoded = encode_call(&call);
        assert_eq!(&encoded[..4], IElectionRegistry::createElectionCall::SELECTOR);
    }
}
