// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Paystack Payment Gateway Adapter
//
// Anti-Corruption Layer for the Paystack transfer API. Domain code sees
// only the PaymentGateway port; Paystack's envelope shapes, minor-unit
// amounts, and webhook signature scheme stay in this module.

use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::GatewaySettings;
use crate::domain::gateway::{
    ConfirmedPayment, GatewayError, PaymentGateway, RecipientAccount, TransferReceipt,
    TransferState,
};
use crate::domain::primitives::Money;

pub struct PaystackGateway {
    client: reqwest::Client,
    endpoint: String,
    secret_key: String,
    webhook_secret: String,
}

#[derive(Serialize)]
struct RecipientRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    name: &'a str,
    account_number: &'a str,
    bank_code: &'a str,
    currency: &'a str,
}

#[derive(Serialize)]
struct TransferRequest<'a> {
    source: &'a str,
    amount: i64,
    recipient: &'a str,
    currency: &'a str,
    reason: &'a str,
    reference: &'a str,
}

#[derive(Deserialize)]
struct Envelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Deserialize)]
struct RecipientData {
    recipient_code: String,
}

#[derive(Deserialize)]
struct TransferData {
    reference: String,
    status: String,
    amount: i64,
    currency: String,
}

#[derive(Deserialize)]
struct WebhookBody {
    event: String,
    data: WebhookData,
}

#[derive(Deserialize)]
struct WebhookData {
    reference: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

impl PaystackGateway {
    pub fn new(settings: &GatewaySettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("failed to build gateway HTTP client")?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            secret_key: settings.secret_key.clone(),
            webhook_secret: settings.webhook_secret.clone(),
        })
    }

    async fn post<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;
        Self::unwrap_envelope(path, response).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.secret_key))
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;
        Self::unwrap_envelope(path, response).await
    }

    async fn unwrap_envelope<T: serde::de::DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(if status.is_client_error() {
                GatewayError::Declined(format!("{} (HTTP {}): {}", path, status, error_text))
            } else {
                GatewayError::Request(format!("{} (HTTP {}): {}", path, status, error_text))
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        if !envelope.status {
            return Err(GatewayError::Declined(
                envelope.message.unwrap_or_else(|| path.to_string()),
            ));
        }
        envelope.data.ok_or_else(|| {
            GatewayError::MalformedResponse(format!("{path}: missing data object"))
        })
    }

    fn receipt_from(data: TransferData) -> Result<TransferReceipt, GatewayError> {
        let state = match data.status.as_str() {
            "success" => TransferState::Success,
            "pending" | "queued" | "processing" | "otp" => TransferState::Pending,
            "failed" | "reversed" | "abandoned" => TransferState::Failed,
            other => {
                return Err(GatewayError::MalformedResponse(format!(
                    "unknown transfer status '{other}'"
                )))
            }
        };
        Ok(TransferReceipt {
            reference: data.reference,
            state,
            amount: Money::from_minor_units(data.amount),
            currency: data.currency,
        })
    }

    fn signature_matches(&self, payload: &[u8], signature: &str) -> bool {
        let mut mac = match Hmac::<Sha512>::new_from_slice(self.webhook_secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(payload);
        let expected = mac.finalize().into_bytes();
        let provided = match hex::decode(signature.trim()) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        expected.ct_eq(provided.as_slice()).into()
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initiate_transfer(
        &self,
        recipient: &RecipientAccount,
        amount: Money,
        currency: &str,
    ) -> Result<TransferReceipt, GatewayError> {
        let minor_units = amount.to_minor_units().ok_or_else(|| {
            GatewayError::Request(format!("amount {amount} not representable in minor units"))
        })?;

        let recipient_data: RecipientData = self
            .post(
                "/transferrecipient",
                &RecipientRequest {
                    kind: "nuban",
                    name: &recipient.account_name,
                    account_number: &recipient.account_number,
                    bank_code: &recipient.bank_code,
                    currency,
                },
            )
            .await?;

        let reference = format!("ESCROW-{}", Uuid::new_v4().simple());
        let data: TransferData = self
            .post(
                "/transfer",
                &TransferRequest {
                    source: "balance",
                    amount: minor_units,
                    recipient: &recipient_data.recipient_code,
                    currency,
                    reason: "Milestone release",
                    reference: &reference,
                },
            )
            .await?;
        Self::receipt_from(data)
    }

    async fn verify_transaction(&self, reference: &str) -> Result<TransferReceipt, GatewayError> {
        let data: TransferData = self.get(&format!("/transfer/verify/{reference}")).await?;
        Self::receipt_from(data)
    }

    fn confirm_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<ConfirmedPayment, GatewayError> {
        if !self.signature_matches(payload, signature) {
            return Err(GatewayError::InvalidSignature);
        }
        let body: WebhookBody = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        if body.event != "charge.success" && body.event != "transfer.success" {
            return Err(GatewayError::MalformedResponse(format!(
                "unhandled webhook event '{}'",
                body.event
            )));
        }
        Ok(ConfirmedPayment {
            reference: body.data.reference,
            amount: Money::from_minor_units(body.data.amount),
            currency: body.data.currency,
            metadata: body.data.metadata,
        })
    }
}
