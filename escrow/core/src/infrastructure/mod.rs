// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod db;
pub mod event_bus;
pub mod gateway;
pub mod memory;
pub mod postgres;

pub use event_bus::{AppEventReceiver, EscrowEventBus, EventBusError, EventReceiver};
pub use gateway::PaystackGateway;
pub use memory::InMemoryLedger;
pub use postgres::PostgresLedger;
