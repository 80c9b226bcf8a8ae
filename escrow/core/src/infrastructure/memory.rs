// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Ledger Store
//!
//! `LedgerStore` implementation for tests and demos. One shard per app
//! behind an owned `tokio::sync::Mutex`; the session edits a working copy
//! of the shard and writes it back on commit, so a dropped session leaves
//! the shard untouched.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::app::{App, PlatformFeeTransaction};
use crate::domain::dispute::Dispute;
use crate::domain::escrow::EscrowTransaction;
use crate::domain::ids::{
    AppId, DisputeId, InvestmentId, MilestoneId, ReleaseId, TransactionId, TransferId, UserId,
};
use crate::domain::investment::{Investment, ShareOwnership};
use crate::domain::milestone::ProjectMilestone;
use crate::domain::release::Release;
use crate::domain::store::{AppSession, LedgerStore, StoreError};
use crate::domain::transfer::ShareTransfer;

#[derive(Clone)]
struct AppShard {
    app: App,
    investments: Vec<Investment>,
    ownerships: Vec<ShareOwnership>,
    entries: Vec<EscrowTransaction>,
    milestones: Vec<ProjectMilestone>,
    releases: Vec<Release>,
    disputes: Vec<Dispute>,
    transfers: Vec<ShareTransfer>,
    platform_fee: Option<PlatformFeeTransaction>,
}

impl AppShard {
    fn new(app: App) -> Self {
        Self {
            app,
            investments: Vec::new(),
            ownerships: Vec::new(),
            entries: Vec::new(),
            milestones: Vec::new(),
            releases: Vec::new(),
            disputes: Vec::new(),
            transfers: Vec::new(),
            platform_fee: None,
        }
    }
}

#[derive(Default)]
pub struct InMemoryLedger {
    apps: DashMap<AppId, Arc<Mutex<AppShard>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones the shard's mutex handle without holding the map ref across
    /// an await.
    fn shard(&self, id: AppId) -> Result<Arc<Mutex<AppShard>>, StoreError> {
        self.apps
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StoreError::NotFound {
                entity: "App",
                id: id.0,
            })
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn register_app(&self, app: &App) -> Result<(), StoreError> {
        match self.apps.entry(app.id) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "app {} already registered",
                app.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(AppShard::new(app.clone()))));
                Ok(())
            }
        }
    }

    async fn get_app(&self, id: AppId) -> Result<Option<App>, StoreError> {
        let shard = match self.apps.get(&id).map(|entry| Arc::clone(entry.value())) {
            Some(shard) => shard,
            None => return Ok(None),
        };
        let locked = shard.lock().await;
        Ok(Some(locked.app.clone()))
    }

    async fn list_apps(&self) -> Result<Vec<App>, StoreError> {
        let shards: Vec<Arc<Mutex<AppShard>>> = self
            .apps
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut apps = Vec::with_capacity(shards.len());
        for shard in shards {
            apps.push(shard.lock().await.app.clone());
        }
        apps.sort_by_key(|a| a.created_at);
        Ok(apps)
    }

    async fn lock_app(&self, id: AppId) -> Result<Box<dyn AppSession>, StoreError> {
        let shard = self.shard(id)?;
        let guard = shard.lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemorySession { guard, working }))
    }
}

/// Unit of work over one shard. Reads and writes go to the working copy;
/// `commit` swaps it into the shard while the owned guard is still held.
pub struct InMemorySession {
    guard: OwnedMutexGuard<AppShard>,
    working: AppShard,
}

#[async_trait]
impl AppSession for InMemorySession {
    fn app(&self) -> &App {
        &self.working.app
    }

    fn app_mut(&mut self) -> &mut App {
        &mut self.working.app
    }

    async fn investments(&mut self) -> Result<Vec<Investment>, StoreError> {
        Ok(self.working.investments.clone())
    }

    async fn find_investment(
        &mut self,
        id: InvestmentId,
    ) -> Result<Option<Investment>, StoreError> {
        Ok(self
            .working
            .investments
            .iter()
            .find(|i| i.id == id)
            .cloned())
    }

    async fn insert_investment(&mut self, investment: &Investment) -> Result<(), StoreError> {
        if self.working.investments.iter().any(|i| i.id == investment.id) {
            return Err(StoreError::Conflict(format!(
                "investment {} already exists",
                investment.id
            )));
        }
        self.working.investments.push(investment.clone());
        Ok(())
    }

    async fn delete_investment(&mut self, id: InvestmentId) -> Result<(), StoreError> {
        let before = self.working.investments.len();
        self.working.investments.retain(|i| i.id != id);
        if self.working.investments.len() == before {
            return Err(StoreError::NotFound {
                entity: "Investment",
                id: id.0,
            });
        }
        Ok(())
    }

    async fn ownership(&mut self, investor: UserId) -> Result<Option<ShareOwnership>, StoreError> {
        Ok(self
            .working
            .ownerships
            .iter()
            .find(|o| o.investor == investor)
            .cloned())
    }

    async fn ownerships(&mut self) -> Result<Vec<ShareOwnership>, StoreError> {
        Ok(self.working.ownerships.clone())
    }

    async fn upsert_ownership(&mut self, ownership: &ShareOwnership) -> Result<(), StoreError> {
        match self
            .working
            .ownerships
            .iter_mut()
            .find(|o| o.investor == ownership.investor)
        {
            Some(existing) => *existing = ownership.clone(),
            None => self.working.ownerships.push(ownership.clone()),
        }
        Ok(())
    }

    async fn entries(&mut self) -> Result<Vec<EscrowTransaction>, StoreError> {
        Ok(self.working.entries.clone())
    }

    async fn find_entry(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<EscrowTransaction>, StoreError> {
        Ok(self.working.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn insert_entry(&mut self, entry: &EscrowTransaction) -> Result<(), StoreError> {
        if self.working.entries.iter().any(|e| e.id == entry.id) {
            return Err(StoreError::Conflict(format!(
                "ledger entry {} already exists",
                entry.id
            )));
        }
        self.working.entries.push(entry.clone());
        Ok(())
    }

    async fn update_entry(&mut self, entry: &EscrowTransaction) -> Result<(), StoreError> {
        match self.working.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => {
                *existing = entry.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "EscrowTransaction",
                id: entry.id.0,
            }),
        }
    }

    async fn milestones(&mut self) -> Result<Vec<ProjectMilestone>, StoreError> {
        let mut milestones = self.working.milestones.clone();
        milestones.sort_by_key(|m| (m.target_date, m.created_at));
        Ok(milestones)
    }

    async fn find_milestone(
        &mut self,
        id: MilestoneId,
    ) -> Result<Option<ProjectMilestone>, StoreError> {
        Ok(self.working.milestones.iter().find(|m| m.id == id).cloned())
    }

    async fn insert_milestone(&mut self, milestone: &ProjectMilestone) -> Result<(), StoreError> {
        if self.working.milestones.iter().any(|m| m.id == milestone.id) {
            return Err(StoreError::Conflict(format!(
                "milestone {} already exists",
                milestone.id
            )));
        }
        self.working.milestones.push(milestone.clone());
        Ok(())
    }

    async fn update_milestone(&mut self, milestone: &ProjectMilestone) -> Result<(), StoreError> {
        match self
            .working
            .milestones
            .iter_mut()
            .find(|m| m.id == milestone.id)
        {
            Some(existing) => {
                *existing = milestone.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "ProjectMilestone",
                id: milestone.id.0,
            }),
        }
    }

    async fn releases(&mut self) -> Result<Vec<Release>, StoreError> {
        Ok(self.working.releases.clone())
    }

    async fn find_release(&mut self, id: ReleaseId) -> Result<Option<Release>, StoreError> {
        Ok(self.working.releases.iter().find(|r| r.id == id).cloned())
    }

    async fn insert_release(&mut self, release: &Release) -> Result<(), StoreError> {
        if self.working.releases.iter().any(|r| r.id == release.id) {
            return Err(StoreError::Conflict(format!(
                "release {} already exists",
                release.id
            )));
        }
        self.working.releases.push(release.clone());
        Ok(())
    }

    async fn update_release(&mut self, release: &Release) -> Result<(), StoreError> {
        match self
            .working
            .releases
            .iter_mut()
            .find(|r| r.id == release.id)
        {
            Some(existing) => {
                *existing = release.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "Release",
                id: release.id.0,
            }),
        }
    }

    async fn disputes(&mut self) -> Result<Vec<Dispute>, StoreError> {
        Ok(self.working.disputes.clone())
    }

    async fn find_dispute(&mut self, id: DisputeId) -> Result<Option<Dispute>, StoreError> {
        Ok(self.working.disputes.iter().find(|d| d.id == id).cloned())
    }

    async fn insert_dispute(&mut self, dispute: &Dispute) -> Result<(), StoreError> {
        if self.working.disputes.iter().any(|d| d.id == dispute.id) {
            return Err(StoreError::Conflict(format!(
                "dispute {} already exists",
                dispute.id
            )));
        }
        self.working.disputes.push(dispute.clone());
        Ok(())
    }

    async fn update_dispute(&mut self, dispute: &Dispute) -> Result<(), StoreError> {
        match self
            .working
            .disputes
            .iter_mut()
            .find(|d| d.id == dispute.id)
        {
            Some(existing) => {
                *existing = dispute.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "Dispute",
                id: dispute.id.0,
            }),
        }
    }

    async fn transfers(&mut self) -> Result<Vec<ShareTransfer>, StoreError> {
        Ok(self.working.transfers.clone())
    }

    async fn find_transfer(&mut self, id: TransferId) -> Result<Option<ShareTransfer>, StoreError> {
        Ok(self.working.transfers.iter().find(|t| t.id == id).cloned())
    }

    async fn insert_transfer(&mut self, transfer: &ShareTransfer) -> Result<(), StoreError> {
        if self.working.transfers.iter().any(|t| t.id == transfer.id) {
            return Err(StoreError::Conflict(format!(
                "transfer {} already exists",
                transfer.id
            )));
        }
        self.working.transfers.push(transfer.clone());
        Ok(())
    }

    async fn update_transfer(&mut self, transfer: &ShareTransfer) -> Result<(), StoreError> {
        match self
            .working
            .transfers
            .iter_mut()
            .find(|t| t.id == transfer.id)
        {
            Some(existing) => {
                *existing = transfer.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "ShareTransfer",
                id: transfer.id.0,
            }),
        }
    }

    async fn find_platform_fee(&mut self) -> Result<Option<PlatformFeeTransaction>, StoreError> {
        Ok(self.working.platform_fee.clone())
    }

    async fn insert_platform_fee(
        &mut self,
        fee: &PlatformFeeTransaction,
    ) -> Result<(), StoreError> {
        if self.working.platform_fee.is_some() {
            return Err(StoreError::Conflict(format!(
                "platform fee already recorded for app {}",
                fee.app
            )));
        }
        self.working.platform_fee = Some(fee.clone());
        Ok(())
    }

    async fn update_platform_fee(
        &mut self,
        fee: &PlatformFeeTransaction,
    ) -> Result<(), StoreError> {
        match &mut self.working.platform_fee {
            Some(existing) if existing.id == fee.id => {
                *existing = fee.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound {
                entity: "PlatformFeeTransaction",
                id: fee.id.0,
            }),
        }
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        *self.guard = self.working;
        Ok(())
    }
}
