// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod apps;
pub mod allocator;
pub mod escrow_ledger;
pub mod milestones;
pub mod releases;
pub mod disputes;
pub mod transfers;
pub mod retry;

// Re-export use cases for convenience
pub use allocator::AllocationService;
pub use apps::AppService;
pub use disputes::DisputeService;
pub use escrow_ledger::EscrowLedgerService;
pub use milestones::MilestoneService;
pub use releases::ReleaseService;
pub use retry::{retry_on_conflict, RetryPolicy};
pub use transfers::TransferService;
