// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer
//!
//! Entities, value objects, domain events, and the storage ports they are
//! persisted through.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure funding/escrow semantics, no I/O

pub mod ids;
pub mod primitives;
pub mod error;
pub mod app;
pub mod investment;
pub mod milestone;
pub mod release;
pub mod escrow;
pub mod dispute;
pub mod transfer;
pub mod events;
pub mod gateway;
pub mod store;
