// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Payment Gateway Port
//!
//! Boundary contract for the external payment provider. The engine treats
//! every gateway call as fallible and slow: transfers are initiated only
//! after the local PROCESSING transition has committed, and no response is
//! trusted without the reference/amount cross-check performed by the
//! release workflow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ids::UserId;
use crate::domain::primitives::Money;

/// Payout destination for a developer. Bank details live outside the engine;
/// the caller resolves them before driving a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientAccount {
    pub user: UserId,
    pub account_name: String,
    pub account_number: String,
    pub bank_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    Pending,
    Success,
    Failed,
}

/// Result of initiating or verifying a transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub reference: String,
    pub state: TransferState,
    pub amount: Money,
    pub currency: String,
}

/// A payment confirmed by the provider through a signed webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmedPayment {
    pub reference: String,
    pub amount: Money,
    pub currency: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    Request(String),
    #[error("Gateway declined the transfer: {0}")]
    Declined(String),
    #[error("Malformed gateway response: {0}")]
    MalformedResponse(String),
    #[error("Gateway reported amount {reported} for a transfer of {expected}")]
    AmountMismatch { expected: Money, reported: Money },
    #[error("Gateway reported reference '{reported}' for transfer '{expected}'")]
    ReferenceMismatch { expected: String, reported: String },
    #[error("Invalid webhook signature")]
    InvalidSignature,
}

/// External payment provider capability.
///
/// `initiate_transfer` and `verify_transaction` talk to the provider's API;
/// `confirm_webhook` authenticates an inbound notification against the
/// webhook secret and parses the confirmed payment out of it.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate_transfer(
        &self,
        recipient: &RecipientAccount,
        amount: Money,
        currency: &str,
    ) -> Result<TransferReceipt, GatewayError>;

    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<TransferReceipt, GatewayError>;

    fn confirm_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<ConfirmedPayment, GatewayError>;
}
