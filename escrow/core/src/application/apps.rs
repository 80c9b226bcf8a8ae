// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! App Registry Use Cases
//!
//! Application service for listing apps on the platform and the operator
//! actions on their lifecycle. Activation lives with the milestone service
//! because it validates the milestone plan.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** App registration and admin lifecycle transitions
//! - **Collaborators:**
//!   - Domain: App aggregate
//!   - Infrastructure: LedgerStore

use std::sync::Arc;

use tracing::info;

use crate::domain::app::{App, AppSubmission};
use crate::domain::error::EngineError;
use crate::domain::ids::AppId;
use crate::domain::store::LedgerStore;

pub struct AppService {
    store: Arc<dyn LedgerStore>,
}

impl AppService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Validates the listing terms and registers the app in PENDING.
    pub async fn register(&self, submission: AppSubmission) -> Result<App, EngineError> {
        let app = App::new(submission)?;
        self.store.register_app(&app).await?;
        info!(app_id = %app.id, name = %app.name, "App registered");
        Ok(app)
    }

    pub async fn get(&self, app_id: AppId) -> Result<App, EngineError> {
        self.store
            .get_app(app_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "App",
                id: app_id.0,
            })
    }

    pub async fn list(&self) -> Result<Vec<App>, EngineError> {
        Ok(self.store.list_apps().await?)
    }

    /// Suspends an ACTIVE or FUNDED app. Allocations and releases against a
    /// held app fail their state guards until `resume`.
    pub async fn put_on_hold(&self, app_id: AppId) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        session.app_mut().put_on_hold()?;
        session.commit().await?;
        info!(app_id = %app_id, "App put on hold");
        Ok(())
    }

    pub async fn resume(&self, app_id: AppId) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        session.app_mut().resume()?;
        session.commit().await?;
        info!(app_id = %app_id, "App resumed");
        Ok(())
    }

    /// Rejects a PENDING listing before it ever reaches the market.
    pub async fn reject(&self, app_id: AppId) -> Result<(), EngineError> {
        let mut session = self.store.lock_app(app_id).await?;
        session.app_mut().reject()?;
        session.commit().await?;
        info!(app_id = %app_id, "App rejected");
        Ok(())
    }
}
