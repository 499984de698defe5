// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deterministic per-voter signing identities.
//!
//! Voters never hold keys. Each voter's secp256k1 signer is recomputed on
//! demand as HMAC-SHA256(service secret, user id): pure, one-way, and never
//! persisted. Distinct user ids yield computationally independent keys.

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::RelayerError;

type HmacSha256 = Hmac<Sha256>;

/// Derives voter signing identities from a service secret.
pub struct IdentityDeriver {
    secret: Vec<u8>,
}

impl IdentityDeriver {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        IdentityDeriver {
            secret: secret.into(),
        }
    }

    /// Derive the signer for a voter. Same inputs always yield the same key.
    ///
    /// The HMAC output is used as the secp256k1 scalar. The negligible
    /// fraction of outputs outside the valid scalar range (zero or over the
    /// curve order, ~2^-128) re-derives with an appended counter byte, so
    /// every user id maps to a key and the mapping stays deterministic.
    pub fn derive(&self, user_id: &str) -> Result<PrivateKeySigner, RelayerError> {
        if user_id.trim().is_empty() {
            return Err(RelayerError::InvalidInput(
                "voter user id must not be empty".to_string(),
            ));
        }

        for counter in 0u8..=255 {
            let mut mac = HmacSha256::new_from_slice(&self.secret)
                .map_err(|e| RelayerError::InvalidInput(format!("bad identity secret: {e}")))?;
            mac.update(user_id.as_bytes());
            if counter > 0 {
                mac.update(&[counter]);
            }
            let candidate = mac.finalize().into_bytes();
            if let Ok(signer) = PrivateKeySigner::from_slice(&candidate) {
                return Ok(signer);
            }
        }

        // 256 consecutive invalid scalars cannot happen with an intact hash.
        Err(RelayerError::InvalidInput(format!(
            "could not derive a signing key for user id {user_id:?}"
        )))
    }

    /// Public address for a voter, the join key against on-chain
    /// registrations.
    pub fn address_for(&self, user_id: &str) -> Result<Address, RelayerError> {
        Ok(self.derive(user_id)?.address())
    }
}

/// Build a signer from a hex-encoded private key (64 characters, no 0x
/// prefix). Used for the operator key supplied via configuration.
pub fn signer_from_hex(private_key_hex: &str) -> Result<PrivateKeySigner, RelayerError> {
    let key_bytes = alloy::hex::decode(private_key_hex.trim_start_matches("0x"))
        .map_err(|e| RelayerError::InvalidInput(format!("invalid private key hex: {e}")))?;
    PrivateKeySigner::from_slice(&key_bytes)
        .map_err(|e| RelayerError::InvalidInput(format!("invalid private key: {e}")))
}

impl std::fmt::Debug for IdentityDeriver {
    // Never expose the secret through Debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityDeriver").finish_non_exhaustive()
    }
}
