// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Ledger Storage Interfaces
//!
//! Persistence contracts for the escrow ledger, defined in the domain layer
//! and implemented in `crate::infrastructure`.
//!
//! | Trait | Implementations |
//! |-------|----------------|
//! | `LedgerStore` | `InMemoryLedger`, `PostgresLedger` |
//! | `AppSession` | `InMemorySession`, `PostgresSession` |
//!
//! ## Locking model
//!
//! All writes to one app's ledger go through [`LedgerStore::lock_app`],
//! which hands back an exclusive [`AppSession`] unit of work. Every check
//! a mutation depends on (balances, equity remaining, entry states) is
//! re-evaluated inside the session, so two racing operations serialize
//! rather than act on stale reads. Dropping a session without
//! [`AppSession::commit`] abandons its writes.

use async_trait::async_trait;

use crate::domain::app::{App, PlatformFeeTransaction};
use crate::domain::dispute::Dispute;
use crate::domain::escrow::EscrowTransaction;
use crate::domain::ids::{
    AppId, DisputeId, InvestmentId, MilestoneId, ReleaseId, TransactionId, TransferId, UserId,
};
use crate::domain::investment::{Investment, ShareOwnership};
use crate::domain::milestone::ProjectMilestone;
use crate::domain::release::Release;
use crate::domain::transfer::ShareTransfer;

/// Exclusive unit of work over one app and everything hanging off it.
///
/// The app row itself is loaded at lock time and edited in place through
/// [`AppSession::app_mut`]; child records are read and written through the
/// session so the backing implementation can scope them to the held lock.
#[async_trait]
pub trait AppSession: Send {
    /// The locked app as of lock acquisition.
    fn app(&self) -> &App;

    /// Mutable working copy of the locked app, flushed at commit.
    fn app_mut(&mut self) -> &mut App;

    /// All investments into the app, oldest first.
    async fn investments(&mut self) -> Result<Vec<Investment>, StoreError>;

    async fn find_investment(&mut self, id: InvestmentId)
        -> Result<Option<Investment>, StoreError>;

    async fn insert_investment(&mut self, investment: &Investment) -> Result<(), StoreError>;

    /// Removes a refunded investment. The compensating ledger entry stays.
    async fn delete_investment(&mut self, id: InvestmentId) -> Result<(), StoreError>;

    /// The investor's current position in the app, if any.
    async fn ownership(&mut self, investor: UserId) -> Result<Option<ShareOwnership>, StoreError>;

    /// Full cap table of the app.
    async fn ownerships(&mut self) -> Result<Vec<ShareOwnership>, StoreError>;

    async fn upsert_ownership(&mut self, ownership: &ShareOwnership) -> Result<(), StoreError>;

    /// The app's ledger, oldest entry first.
    async fn entries(&mut self) -> Result<Vec<EscrowTransaction>, StoreError>;

    async fn find_entry(&mut self, id: TransactionId)
        -> Result<Option<EscrowTransaction>, StoreError>;

    async fn insert_entry(&mut self, entry: &EscrowTransaction) -> Result<(), StoreError>;

    async fn update_entry(&mut self, entry: &EscrowTransaction) -> Result<(), StoreError>;

    /// The app's milestones in plan order.
    async fn milestones(&mut self) -> Result<Vec<ProjectMilestone>, StoreError>;

    async fn find_milestone(&mut self, id: MilestoneId)
        -> Result<Option<ProjectMilestone>, StoreError>;

    async fn insert_milestone(&mut self, milestone: &ProjectMilestone) -> Result<(), StoreError>;

    async fn update_milestone(&mut self, milestone: &ProjectMilestone) -> Result<(), StoreError>;

    async fn releases(&mut self) -> Result<Vec<Release>, StoreError>;

    async fn find_release(&mut self, id: ReleaseId) -> Result<Option<Release>, StoreError>;

    async fn insert_release(&mut self, release: &Release) -> Result<(), StoreError>;

    async fn update_release(&mut self, release: &Release) -> Result<(), StoreError>;

    async fn disputes(&mut self) -> Result<Vec<Dispute>, StoreError>;

    async fn find_dispute(&mut self, id: DisputeId) -> Result<Option<Dispute>, StoreError>;

    async fn insert_dispute(&mut self, dispute: &Dispute) -> Result<(), StoreError>;

    async fn update_dispute(&mut self, dispute: &Dispute) -> Result<(), StoreError>;

    async fn transfers(&mut self) -> Result<Vec<ShareTransfer>, StoreError>;

    async fn find_transfer(&mut self, id: TransferId)
        -> Result<Option<ShareTransfer>, StoreError>;

    async fn insert_transfer(&mut self, transfer: &ShareTransfer) -> Result<(), StoreError>;

    async fn update_transfer(&mut self, transfer: &ShareTransfer) -> Result<(), StoreError>;

    /// The app's platform fee record, created at full funding.
    async fn find_platform_fee(&mut self) -> Result<Option<PlatformFeeTransaction>, StoreError>;

    async fn insert_platform_fee(&mut self, fee: &PlatformFeeTransaction)
        -> Result<(), StoreError>;

    async fn update_platform_fee(&mut self, fee: &PlatformFeeTransaction)
        -> Result<(), StoreError>;

    /// Flushes the working app copy and makes all session writes durable.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Entry point to the ledger: app registry plus per-app locking.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Registers a newly submitted app.
    async fn register_app(&self, app: &App) -> Result<(), StoreError>;

    /// Point-in-time read of an app without taking its lock.
    async fn get_app(&self, id: AppId) -> Result<Option<App>, StoreError>;

    async fn list_apps(&self) -> Result<Vec<App>, StoreError>;

    /// Acquires the app's exclusive session. Fails with
    /// [`StoreError::NotFound`] for an unknown app and
    /// [`StoreError::Conflict`] when the lock cannot be taken in time.
    async fn lock_app(&self, id: AppId) -> Result<Box<dyn AppSession>, StoreError>;
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound {
        entity: &'static str,
        id: uuid::Uuid,
    },

    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if let Some(code) = db.code() {
                // serialization_failure, deadlock_detected, lock_not_available
                if matches!(code.as_ref(), "40001" | "40P01" | "55P03") {
                    return StoreError::Conflict(db.to_string());
                }
            }
        }
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
