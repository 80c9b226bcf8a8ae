// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Equity allocation and escrow release engine.
//!
//! Sells fixed equity percentages in apps, holds investor money in escrow,
//! and pays it out to developers in milestone-sized tranches once each
//! milestone is verified. Covers allocation, the escrow ledger, milestone
//! verification, gateway payouts, disputes, and secondary share transfers.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Funding and escrow semantics behind storage and gateway ports

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod config;

pub use domain::*;
