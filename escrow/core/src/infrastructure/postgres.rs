// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! PostgreSQL Ledger Store
//!
//! Production `LedgerStore` backed by PostgreSQL. `lock_app` opens a
//! transaction, applies the configured `lock_timeout`, and takes the app
//! row with `SELECT … FOR UPDATE`; every session write runs inside that
//! transaction and becomes visible only at commit.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist the app aggregate and its ledger rows
//! - **Integration:** Domain `LedgerStore`/`AppSession` → `apps`,
//!   `investments`, `share_ownership`, `escrow_transactions`,
//!   `project_milestones`, `releases`, `disputes`, `share_transfers`,
//!   `platform_fee_transactions` tables (see `migrations/`)
//!
//! # Concurrency
//!
//! Lock waits that exceed `lock_timeout`, serialization failures, and
//! deadlocks surface as [`StoreError::Conflict`] through the
//! `From<sqlx::Error>` mapping, so callers can retry the whole operation.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};

use crate::domain::app::{App, AppStatus, FeeStatus, PlatformFeeTransaction};
use crate::domain::dispute::{Dispute, DisputeCaseStatus};
use crate::domain::escrow::{
    DisputeOutcome, DisputeStatus, EscrowTransaction, TransactionKind, TransactionStatus,
};
use crate::domain::ids::{
    AppId, DisputeId, FeeId, InvestmentId, MilestoneId, ReleaseId, TransactionId, TransferId,
    UserId,
};
use crate::domain::investment::{Investment, ShareOwnership};
use crate::domain::milestone::{MilestoneStatus, ProjectMilestone};
use crate::domain::primitives::{Money, Percentage};
use crate::domain::release::{Release, ReleaseStatus};
use crate::domain::store::{AppSession, LedgerStore, StoreError};
use crate::domain::transfer::{ShareTransfer, TransferStatus};
use crate::infrastructure::db::Database;

const APP_COLUMNS: &str = "id, name, developer_id, currency, exchange_rate, funding_goal, \
     available_percentage, remaining_percentage, min_investment_percentage, funds_in_escrow, \
     lock_in_period_days, use_of_funds, status, created_at, updated_at";

pub struct PostgresLedger {
    db: Database,
    lock_timeout: Duration,
}

impl PostgresLedger {
    pub fn new(db: Database, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn register_app(&self, app: &App) -> Result<(), StoreError> {
        let use_of_funds = serde_json::to_value(&app.use_of_funds)?;
        sqlx::query(
            r#"
            INSERT INTO apps (
                id, name, developer_id, currency, exchange_rate, funding_goal,
                available_percentage, remaining_percentage, min_investment_percentage,
                funds_in_escrow, lock_in_period_days, use_of_funds, status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(app.id.0)
        .bind(&app.name)
        .bind(app.developer.0)
        .bind(&app.currency)
        .bind(app.exchange_rate)
        .bind(app.funding_goal.amount())
        .bind(app.available_percentage.value())
        .bind(app.remaining_percentage.value())
        .bind(app.min_investment_percentage.value())
        .bind(app.funds_in_escrow.amount())
        .bind(app.lock_in_period_days as i32)
        .bind(use_of_funds)
        .bind(app.status.as_str())
        .bind(app.created_at)
        .bind(app.updated_at)
        .execute(self.db.get_pool())
        .await?;
        Ok(())
    }

    async fn get_app(&self, id: AppId) -> Result<Option<App>, StoreError> {
        let row = sqlx::query(&format!("SELECT {APP_COLUMNS} FROM apps WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(self.db.get_pool())
            .await?;
        row.map(|r| app_from_row(&r)).transpose()
    }

    async fn list_apps(&self) -> Result<Vec<App>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {APP_COLUMNS} FROM apps ORDER BY created_at"
        ))
        .fetch_all(self.db.get_pool())
        .await?;
        rows.iter().map(app_from_row).collect()
    }

    async fn lock_app(&self, id: AppId) -> Result<Box<dyn AppSession>, StoreError> {
        let mut tx = self.db.get_pool().begin().await?;

        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {APP_COLUMNS} FROM apps WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "App",
            id: id.0,
        })?;

        let app = app_from_row(&row)?;
        Ok(Box::new(PostgresSession { tx, app }))
    }
}

/// Unit of work bound to one open transaction holding the app row lock.
pub struct PostgresSession {
    tx: Transaction<'static, Postgres>,
    app: App,
}

#[async_trait]
impl AppSession for PostgresSession {
    fn app(&self) -> &App {
        &self.app
    }

    fn app_mut(&mut self) -> &mut App {
        &mut self.app
    }

    async fn investments(&mut self) -> Result<Vec<Investment>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, app_id, investor_id, amount_paid, percentage_bought, created_at \
             FROM investments WHERE app_id = $1 ORDER BY created_at",
        )
        .bind(self.app.id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(investment_from_row).collect()
    }

    async fn find_investment(
        &mut self,
        id: InvestmentId,
    ) -> Result<Option<Investment>, StoreError> {
        let row = sqlx::query(
            "SELECT id, app_id, investor_id, amount_paid, percentage_bought, created_at \
             FROM investments WHERE app_id = $1 AND id = $2",
        )
        .bind(self.app.id.0)
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|r| investment_from_row(&r)).transpose()
    }

    async fn insert_investment(&mut self, investment: &Investment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO investments (id, app_id, investor_id, amount_paid, percentage_bought, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(investment.id.0)
        .bind(investment.app.0)
        .bind(investment.investor.0)
        .bind(investment.amount_paid.amount())
        .bind(investment.percentage_bought.value())
        .bind(investment.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_investment(&mut self, id: InvestmentId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM investments WHERE app_id = $1 AND id = $2")
            .bind(self.app.id.0)
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "Investment",
                id: id.0,
            });
        }
        Ok(())
    }

    async fn ownership(&mut self, investor: UserId) -> Result<Option<ShareOwnership>, StoreError> {
        let row = sqlx::query(
            "SELECT app_id, investor_id, percentage_owned, updated_at \
             FROM share_ownership WHERE app_id = $1 AND investor_id = $2",
        )
        .bind(self.app.id.0)
        .bind(investor.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|r| ownership_from_row(&r)).transpose()
    }

    async fn ownerships(&mut self) -> Result<Vec<ShareOwnership>, StoreError> {
        let rows = sqlx::query(
            "SELECT app_id, investor_id, percentage_owned, updated_at \
             FROM share_ownership WHERE app_id = $1 ORDER BY investor_id",
        )
        .bind(self.app.id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(ownership_from_row).collect()
    }

    async fn upsert_ownership(&mut self, ownership: &ShareOwnership) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO share_ownership (app_id, investor_id, percentage_owned, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (app_id, investor_id) DO UPDATE SET
                percentage_owned = EXCLUDED.percentage_owned,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(ownership.app.0)
        .bind(ownership.investor.0)
        .bind(ownership.percentage_owned.value())
        .bind(ownership.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn entries(&mut self) -> Result<Vec<EscrowTransaction>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, app_id, investor_id, kind, amount, status, dispute_status, \
             milestone_id, release_id, investment_id, original_transaction_id, \
             gateway_reference, dispute_reason, resolution_notes, resolved_by, \
             created_at, completed_at \
             FROM escrow_transactions WHERE app_id = $1 ORDER BY created_at, id",
        )
        .bind(self.app.id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn find_entry(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<EscrowTransaction>, StoreError> {
        let row = sqlx::query(
            "SELECT id, app_id, investor_id, kind, amount, status, dispute_status, \
             milestone_id, release_id, investment_id, original_transaction_id, \
             gateway_reference, dispute_reason, resolution_notes, resolved_by, \
             created_at, completed_at \
             FROM escrow_transactions WHERE app_id = $1 AND id = $2",
        )
        .bind(self.app.id.0)
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|r| entry_from_row(&r)).transpose()
    }

    async fn insert_entry(&mut self, entry: &EscrowTransaction) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO escrow_transactions (
                id, app_id, investor_id, kind, amount, status, dispute_status,
                milestone_id, release_id, investment_id, original_transaction_id,
                gateway_reference, dispute_reason, resolution_notes, resolved_by,
                created_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(entry.id.0)
        .bind(entry.app.0)
        .bind(entry.investor.0)
        .bind(entry.kind.as_str())
        .bind(entry.amount.amount())
        .bind(entry.status.as_str())
        .bind(entry.dispute_status.as_str())
        .bind(entry.milestone.map(|m| m.0))
        .bind(entry.release.map(|r| r.0))
        .bind(entry.investment.map(|i| i.0))
        .bind(entry.original_transaction.map(|t| t.0))
        .bind(entry.gateway_reference.as_deref())
        .bind(entry.dispute_reason.as_deref())
        .bind(entry.resolution_notes.as_deref())
        .bind(entry.resolved_by.map(|u| u.0))
        .bind(entry.created_at)
        .bind(entry.completed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_entry(&mut self, entry: &EscrowTransaction) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE escrow_transactions SET
                kind = $3, amount = $4, status = $5, dispute_status = $6,
                milestone_id = $7, release_id = $8, investment_id = $9,
                original_transaction_id = $10, gateway_reference = $11,
                dispute_reason = $12, resolution_notes = $13, resolved_by = $14,
                completed_at = $15
            WHERE app_id = $1 AND id = $2
            "#,
        )
        .bind(entry.app.0)
        .bind(entry.id.0)
        .bind(entry.kind.as_str())
        .bind(entry.amount.amount())
        .bind(entry.status.as_str())
        .bind(entry.dispute_status.as_str())
        .bind(entry.milestone.map(|m| m.0))
        .bind(entry.release.map(|r| r.0))
        .bind(entry.investment.map(|i| i.0))
        .bind(entry.original_transaction.map(|t| t.0))
        .bind(entry.gateway_reference.as_deref())
        .bind(entry.dispute_reason.as_deref())
        .bind(entry.resolution_notes.as_deref())
        .bind(entry.resolved_by.map(|u| u.0))
        .bind(entry.completed_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "EscrowTransaction",
                id: entry.id.0,
            });
        }
        Ok(())
    }

    async fn milestones(&mut self) -> Result<Vec<ProjectMilestone>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, app_id, title, description, target_date, release_percentage, status, \
             progress, verification_requested_at, verified_at, verified_by, verification_notes, \
             completion_date, created_at, updated_at \
             FROM project_milestones WHERE app_id = $1 ORDER BY target_date, created_at",
        )
        .bind(self.app.id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(milestone_from_row).collect()
    }

    async fn find_milestone(
        &mut self,
        id: MilestoneId,
    ) -> Result<Option<ProjectMilestone>, StoreError> {
        let row = sqlx::query(
            "SELECT id, app_id, title, description, target_date, release_percentage, status, \
             progress, verification_requested_at, verified_at, verified_by, verification_notes, \
             completion_date, created_at, updated_at \
             FROM project_milestones WHERE app_id = $1 AND id = $2",
        )
        .bind(self.app.id.0)
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|r| milestone_from_row(&r)).transpose()
    }

    async fn insert_milestone(&mut self, milestone: &ProjectMilestone) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO project_milestones (
                id, app_id, title, description, target_date, release_percentage, status,
                progress, verification_requested_at, verified_at, verified_by,
                verification_notes, completion_date, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(milestone.id.0)
        .bind(milestone.app.0)
        .bind(&milestone.title)
        .bind(&milestone.description)
        .bind(milestone.target_date)
        .bind(milestone.release_percentage.value())
        .bind(milestone.status.as_str())
        .bind(milestone.progress as i16)
        .bind(milestone.verification_requested_at)
        .bind(milestone.verified_at)
        .bind(milestone.verified_by.map(|u| u.0))
        .bind(milestone.verification_notes.as_deref())
        .bind(milestone.completion_date)
        .bind(milestone.created_at)
        .bind(milestone.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_milestone(&mut self, milestone: &ProjectMilestone) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE project_milestones SET
                title = $3, description = $4, target_date = $5, release_percentage = $6,
                status = $7, progress = $8, verification_requested_at = $9,
                verified_at = $10, verified_by = $11, verification_notes = $12,
                completion_date = $13, updated_at = $14
            WHERE app_id = $1 AND id = $2
            "#,
        )
        .bind(milestone.app.0)
        .bind(milestone.id.0)
        .bind(&milestone.title)
        .bind(&milestone.description)
        .bind(milestone.target_date)
        .bind(milestone.release_percentage.value())
        .bind(milestone.status.as_str())
        .bind(milestone.progress as i16)
        .bind(milestone.verification_requested_at)
        .bind(milestone.verified_at)
        .bind(milestone.verified_by.map(|u| u.0))
        .bind(milestone.verification_notes.as_deref())
        .bind(milestone.completion_date)
        .bind(milestone.updated_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "ProjectMilestone",
                id: milestone.id.0,
            });
        }
        Ok(())
    }

    async fn releases(&mut self) -> Result<Vec<Release>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, app_id, milestone_id, amount, status, approval_requested_at, \
             approval_requested_by, approved_by, approved_at, approval_notes, rejected_by, \
             rejected_at, rejection_reason, transaction_reference, failure_reason, \
             created_at, updated_at, processed_at, completed_at \
             FROM releases WHERE app_id = $1 ORDER BY created_at",
        )
        .bind(self.app.id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(release_from_row).collect()
    }

    async fn find_release(&mut self, id: ReleaseId) -> Result<Option<Release>, StoreError> {
        let row = sqlx::query(
            "SELECT id, app_id, milestone_id, amount, status, approval_requested_at, \
             approval_requested_by, approved_by, approved_at, approval_notes, rejected_by, \
             rejected_at, rejection_reason, transaction_reference, failure_reason, \
             created_at, updated_at, processed_at, completed_at \
             FROM releases WHERE app_id = $1 AND id = $2",
        )
        .bind(self.app.id.0)
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|r| release_from_row(&r)).transpose()
    }

    async fn insert_release(&mut self, release: &Release) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO releases (
                id, app_id, milestone_id, amount, status, approval_requested_at,
                approval_requested_by, approved_by, approved_at, approval_notes,
                rejected_by, rejected_at, rejection_reason, transaction_reference,
                failure_reason, created_at, updated_at, processed_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19)
            "#,
        )
        .bind(release.id.0)
        .bind(release.app.0)
        .bind(release.milestone.0)
        .bind(release.amount.amount())
        .bind(release.status.as_str())
        .bind(release.approval_requested_at)
        .bind(release.approval_requested_by.map(|u| u.0))
        .bind(release.approved_by.map(|u| u.0))
        .bind(release.approved_at)
        .bind(release.approval_notes.as_deref())
        .bind(release.rejected_by.map(|u| u.0))
        .bind(release.rejected_at)
        .bind(release.rejection_reason.as_deref())
        .bind(release.transaction_reference.as_deref())
        .bind(release.failure_reason.as_deref())
        .bind(release.created_at)
        .bind(release.updated_at)
        .bind(release.processed_at)
        .bind(release.completed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_release(&mut self, release: &Release) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE releases SET
                amount = $3, status = $4, approval_requested_at = $5,
                approval_requested_by = $6, approved_by = $7, approved_at = $8,
                approval_notes = $9, rejected_by = $10, rejected_at = $11,
                rejection_reason = $12, transaction_reference = $13,
                failure_reason = $14, updated_at = $15, processed_at = $16,
                completed_at = $17
            WHERE app_id = $1 AND id = $2
            "#,
        )
        .bind(release.app.0)
        .bind(release.id.0)
        .bind(release.amount.amount())
        .bind(release.status.as_str())
        .bind(release.approval_requested_at)
        .bind(release.approval_requested_by.map(|u| u.0))
        .bind(release.approved_by.map(|u| u.0))
        .bind(release.approved_at)
        .bind(release.approval_notes.as_deref())
        .bind(release.rejected_by.map(|u| u.0))
        .bind(release.rejected_at)
        .bind(release.rejection_reason.as_deref())
        .bind(release.transaction_reference.as_deref())
        .bind(release.failure_reason.as_deref())
        .bind(release.updated_at)
        .bind(release.processed_at)
        .bind(release.completed_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "Release",
                id: release.id.0,
            });
        }
        Ok(())
    }

    async fn disputes(&mut self) -> Result<Vec<Dispute>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, app_id, transaction_id, raised_by, reason, status, assigned_to, \
             escalation_note, resolution, resolution_notes, resolved_by, resolved_at, \
             created_at, updated_at, closed_at \
             FROM disputes WHERE app_id = $1 ORDER BY created_at",
        )
        .bind(self.app.id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(dispute_from_row).collect()
    }

    async fn find_dispute(&mut self, id: DisputeId) -> Result<Option<Dispute>, StoreError> {
        let row = sqlx::query(
            "SELECT id, app_id, transaction_id, raised_by, reason, status, assigned_to, \
             escalation_note, resolution, resolution_notes, resolved_by, resolved_at, \
             created_at, updated_at, closed_at \
             FROM disputes WHERE app_id = $1 AND id = $2",
        )
        .bind(self.app.id.0)
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|r| dispute_from_row(&r)).transpose()
    }

    async fn insert_dispute(&mut self, dispute: &Dispute) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO disputes (
                id, app_id, transaction_id, raised_by, reason, status, assigned_to,
                escalation_note, resolution, resolution_notes, resolved_by, resolved_at,
                created_at, updated_at, closed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(dispute.id.0)
        .bind(dispute.app.0)
        .bind(dispute.transaction.0)
        .bind(dispute.raised_by.0)
        .bind(&dispute.reason)
        .bind(dispute.status.as_str())
        .bind(dispute.assigned_to.map(|u| u.0))
        .bind(dispute.escalation_note.as_deref())
        .bind(dispute.resolution.map(|r| r.as_str()))
        .bind(dispute.resolution_notes.as_deref())
        .bind(dispute.resolved_by.map(|u| u.0))
        .bind(dispute.resolved_at)
        .bind(dispute.created_at)
        .bind(dispute.updated_at)
        .bind(dispute.closed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_dispute(&mut self, dispute: &Dispute) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE disputes SET
                status = $3, assigned_to = $4, escalation_note = $5, resolution = $6,
                resolution_notes = $7, resolved_by = $8, resolved_at = $9,
                updated_at = $10, closed_at = $11
            WHERE app_id = $1 AND id = $2
            "#,
        )
        .bind(dispute.app.0)
        .bind(dispute.id.0)
        .bind(dispute.status.as_str())
        .bind(dispute.assigned_to.map(|u| u.0))
        .bind(dispute.escalation_note.as_deref())
        .bind(dispute.resolution.map(|r| r.as_str()))
        .bind(dispute.resolution_notes.as_deref())
        .bind(dispute.resolved_by.map(|u| u.0))
        .bind(dispute.resolved_at)
        .bind(dispute.updated_at)
        .bind(dispute.closed_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "Dispute",
                id: dispute.id.0,
            });
        }
        Ok(())
    }

    async fn transfers(&mut self) -> Result<Vec<ShareTransfer>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, app_id, seller_id, buyer_id, percentage_amount, price_per_percentage, \
             total_amount, currency, status, escrow_transaction_id, created_at, updated_at, \
             completed_at \
             FROM share_transfers WHERE app_id = $1 ORDER BY created_at",
        )
        .bind(self.app.id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(transfer_from_row).collect()
    }

    async fn find_transfer(&mut self, id: TransferId) -> Result<Option<ShareTransfer>, StoreError> {
        let row = sqlx::query(
            "SELECT id, app_id, seller_id, buyer_id, percentage_amount, price_per_percentage, \
             total_amount, currency, status, escrow_transaction_id, created_at, updated_at, \
             completed_at \
             FROM share_transfers WHERE app_id = $1 AND id = $2",
        )
        .bind(self.app.id.0)
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|r| transfer_from_row(&r)).transpose()
    }

    async fn insert_transfer(&mut self, transfer: &ShareTransfer) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO share_transfers (
                id, app_id, seller_id, buyer_id, percentage_amount, price_per_percentage,
                total_amount, currency, status, escrow_transaction_id,
                created_at, updated_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(transfer.id.0)
        .bind(transfer.app.0)
        .bind(transfer.seller.0)
        .bind(transfer.buyer.0)
        .bind(transfer.percentage_amount.value())
        .bind(transfer.price_per_percentage.amount())
        .bind(transfer.total_amount.amount())
        .bind(&transfer.currency)
        .bind(transfer.status.as_str())
        .bind(transfer.escrow_transaction.map(|t| t.0))
        .bind(transfer.created_at)
        .bind(transfer.updated_at)
        .bind(transfer.completed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_transfer(&mut self, transfer: &ShareTransfer) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE share_transfers SET
                status = $3, escrow_transaction_id = $4, updated_at = $5, completed_at = $6
            WHERE app_id = $1 AND id = $2
            "#,
        )
        .bind(transfer.app.0)
        .bind(transfer.id.0)
        .bind(transfer.status.as_str())
        .bind(transfer.escrow_transaction.map(|t| t.0))
        .bind(transfer.updated_at)
        .bind(transfer.completed_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "ShareTransfer",
                id: transfer.id.0,
            });
        }
        Ok(())
    }

    async fn find_platform_fee(&mut self) -> Result<Option<PlatformFeeTransaction>, StoreError> {
        let row = sqlx::query(
            "SELECT id, app_id, amount, status, created_at, settled_at \
             FROM platform_fee_transactions WHERE app_id = $1",
        )
        .bind(self.app.id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|r| fee_from_row(&r)).transpose()
    }

    async fn insert_platform_fee(
        &mut self,
        fee: &PlatformFeeTransaction,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO platform_fee_transactions (id, app_id, amount, status, created_at, settled_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(fee.id.0)
        .bind(fee.app.0)
        .bind(fee.amount.amount())
        .bind(fee.status.as_str())
        .bind(fee.created_at)
        .bind(fee.settled_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_platform_fee(
        &mut self,
        fee: &PlatformFeeTransaction,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE platform_fee_transactions SET amount = $3, status = $4, settled_at = $5 \
             WHERE app_id = $1 AND id = $2",
        )
        .bind(fee.app.0)
        .bind(fee.id.0)
        .bind(fee.amount.amount())
        .bind(fee.status.as_str())
        .bind(fee.settled_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "PlatformFeeTransaction",
                id: fee.id.0,
            });
        }
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let use_of_funds = serde_json::to_value(&self.app.use_of_funds)?;
        sqlx::query(
            r#"
            UPDATE apps SET
                name = $2, currency = $3, exchange_rate = $4, funding_goal = $5,
                available_percentage = $6, remaining_percentage = $7,
                min_investment_percentage = $8, funds_in_escrow = $9,
                lock_in_period_days = $10, use_of_funds = $11, status = $12,
                updated_at = $13
            WHERE id = $1
            "#,
        )
        .bind(self.app.id.0)
        .bind(&self.app.name)
        .bind(&self.app.currency)
        .bind(self.app.exchange_rate)
        .bind(self.app.funding_goal.amount())
        .bind(self.app.available_percentage.value())
        .bind(self.app.remaining_percentage.value())
        .bind(self.app.min_investment_percentage.value())
        .bind(self.app.funds_in_escrow.amount())
        .bind(self.app.lock_in_period_days as i32)
        .bind(use_of_funds)
        .bind(self.app.status.as_str())
        .bind(self.app.updated_at)
        .execute(&mut *self.tx)
        .await?;

        self.tx.commit().await?;
        Ok(())
    }
}

fn bad_status(what: &'static str, raw: &str) -> StoreError {
    StoreError::Serialization(format!("unknown {what} '{raw}'"))
}

fn app_from_row(row: &PgRow) -> Result<App, StoreError> {
    let status_raw: String = row.get("status");
    let use_of_funds: serde_json::Value = row.get("use_of_funds");
    Ok(App {
        id: AppId(row.get("id")),
        name: row.get("name"),
        developer: UserId(row.get("developer_id")),
        currency: row.get("currency"),
        exchange_rate: row.get("exchange_rate"),
        funding_goal: Money::new(row.get("funding_goal")),
        available_percentage: Percentage::new(row.get("available_percentage")),
        remaining_percentage: Percentage::new(row.get("remaining_percentage")),
        min_investment_percentage: Percentage::new(row.get("min_investment_percentage")),
        funds_in_escrow: Money::new(row.get("funds_in_escrow")),
        lock_in_period_days: row.get::<i32, _>("lock_in_period_days") as u32,
        use_of_funds: serde_json::from_value(use_of_funds)?,
        status: AppStatus::parse(&status_raw).ok_or_else(|| bad_status("app status", &status_raw))?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn investment_from_row(row: &PgRow) -> Result<Investment, StoreError> {
    Ok(Investment {
        id: InvestmentId(row.get("id")),
        investor: UserId(row.get("investor_id")),
        app: AppId(row.get("app_id")),
        amount_paid: Money::new(row.get("amount_paid")),
        percentage_bought: Percentage::new(row.get("percentage_bought")),
        created_at: row.get("created_at"),
    })
}

fn ownership_from_row(row: &PgRow) -> Result<ShareOwnership, StoreError> {
    Ok(ShareOwnership {
        investor: UserId(row.get("investor_id")),
        app: AppId(row.get("app_id")),
        percentage_owned: Percentage::new(row.get("percentage_owned")),
        updated_at: row.get("updated_at"),
    })
}

fn entry_from_row(row: &PgRow) -> Result<EscrowTransaction, StoreError> {
    let kind_raw: String = row.get("kind");
    let status_raw: String = row.get("status");
    let dispute_raw: String = row.get("dispute_status");
    Ok(EscrowTransaction {
        id: TransactionId(row.get("id")),
        app: AppId(row.get("app_id")),
        investor: UserId(row.get("investor_id")),
        kind: TransactionKind::parse(&kind_raw)
            .ok_or_else(|| bad_status("transaction kind", &kind_raw))?,
        amount: Money::new(row.get("amount")),
        status: TransactionStatus::parse(&status_raw)
            .ok_or_else(|| bad_status("transaction status", &status_raw))?,
        dispute_status: DisputeStatus::parse(&dispute_raw)
            .ok_or_else(|| bad_status("dispute status", &dispute_raw))?,
        milestone: row.get::<Option<uuid::Uuid>, _>("milestone_id").map(MilestoneId),
        release: row.get::<Option<uuid::Uuid>, _>("release_id").map(ReleaseId),
        investment: row
            .get::<Option<uuid::Uuid>, _>("investment_id")
            .map(InvestmentId),
        original_transaction: row
            .get::<Option<uuid::Uuid>, _>("original_transaction_id")
            .map(TransactionId),
        gateway_reference: row.get("gateway_reference"),
        dispute_reason: row.get("dispute_reason"),
        resolution_notes: row.get("resolution_notes"),
        resolved_by: row.get::<Option<uuid::Uuid>, _>("resolved_by").map(UserId),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    })
}

fn milestone_from_row(row: &PgRow) -> Result<ProjectMilestone, StoreError> {
    let status_raw: String = row.get("status");
    Ok(ProjectMilestone {
        id: MilestoneId(row.get("id")),
        app: AppId(row.get("app_id")),
        title: row.get("title"),
        description: row.get("description"),
        target_date: row.get("target_date"),
        release_percentage: Percentage::new(row.get("release_percentage")),
        status: MilestoneStatus::parse(&status_raw)
            .ok_or_else(|| bad_status("milestone status", &status_raw))?,
        progress: row.get::<i16, _>("progress") as u8,
        verification_requested_at: row.get("verification_requested_at"),
        verified_at: row.get("verified_at"),
        verified_by: row.get::<Option<uuid::Uuid>, _>("verified_by").map(UserId),
        verification_notes: row.get("verification_notes"),
        completion_date: row.get("completion_date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn release_from_row(row: &PgRow) -> Result<Release, StoreError> {
    let status_raw: String = row.get("status");
    Ok(Release {
        id: ReleaseId(row.get("id")),
        app: AppId(row.get("app_id")),
        milestone: MilestoneId(row.get("milestone_id")),
        amount: Money::new(row.get("amount")),
        status: ReleaseStatus::parse(&status_raw)
            .ok_or_else(|| bad_status("release status", &status_raw))?,
        approval_requested_at: row.get("approval_requested_at"),
        approval_requested_by: row
            .get::<Option<uuid::Uuid>, _>("approval_requested_by")
            .map(UserId),
        approved_by: row.get::<Option<uuid::Uuid>, _>("approved_by").map(UserId),
        approved_at: row.get("approved_at"),
        approval_notes: row.get("approval_notes"),
        rejected_by: row.get::<Option<uuid::Uuid>, _>("rejected_by").map(UserId),
        rejected_at: row.get("rejected_at"),
        rejection_reason: row.get("rejection_reason"),
        transaction_reference: row.get("transaction_reference"),
        failure_reason: row.get("failure_reason"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        processed_at: row.get("processed_at"),
        completed_at: row.get("completed_at"),
    })
}

fn dispute_from_row(row: &PgRow) -> Result<Dispute, StoreError> {
    let status_raw: String = row.get("status");
    let resolution_raw: Option<String> = row.get("resolution");
    let resolution = match resolution_raw {
        Some(raw) => Some(
            DisputeOutcome::parse(&raw).ok_or_else(|| bad_status("dispute resolution", &raw))?,
        ),
        None => None,
    };
    Ok(Dispute {
        id: DisputeId(row.get("id")),
        app: AppId(row.get("app_id")),
        transaction: TransactionId(row.get("transaction_id")),
        raised_by: UserId(row.get("raised_by")),
        reason: row.get("reason"),
        status: DisputeCaseStatus::parse(&status_raw)
            .ok_or_else(|| bad_status("dispute case status", &status_raw))?,
        assigned_to: row.get::<Option<uuid::Uuid>, _>("assigned_to").map(UserId),
        escalation_note: row.get("escalation_note"),
        resolution,
        resolution_notes: row.get("resolution_notes"),
        resolved_by: row.get::<Option<uuid::Uuid>, _>("resolved_by").map(UserId),
        resolved_at: row.get("resolved_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        closed_at: row.get("closed_at"),
    })
}

fn transfer_from_row(row: &PgRow) -> Result<ShareTransfer, StoreError> {
    let status_raw: String = row.get("status");
    Ok(ShareTransfer {
        id: TransferId(row.get("id")),
        app: AppId(row.get("app_id")),
        seller: UserId(row.get("seller_id")),
        buyer: UserId(row.get("buyer_id")),
        percentage_amount: Percentage::new(row.get("percentage_amount")),
        price_per_percentage: Money::new(row.get("price_per_percentage")),
        total_amount: Money::new(row.get("total_amount")),
        currency: row.get("currency"),
        status: TransferStatus::parse(&status_raw)
            .ok_or_else(|| bad_status("transfer status", &status_raw))?,
        escrow_transaction: row
            .get::<Option<uuid::Uuid>, _>("escrow_transaction_id")
            .map(TransactionId),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
    })
}

fn fee_from_row(row: &PgRow) -> Result<PlatformFeeTransaction, StoreError> {
    let status_raw: String = row.get("status");
    Ok(PlatformFeeTransaction {
        id: FeeId(row.get("id")),
        app: AppId(row.get("app_id")),
        amount: Money::new(row.get("amount")),
        status: FeeStatus::parse(&status_raw).ok_or_else(|| bad_status("fee status", &status_raw))?,
        created_at: row.get("created_at"),
        settled_at: row.get("settled_at"),
    })
}
