// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM chain integration.
//!
//! This module provides:
//! - the election registry contract binding and its event/revert decoders
//! - the EVM-backed implementation of the ledger seam

pub mod client;
pub mod contract;

pub use client::EvmLedger;
