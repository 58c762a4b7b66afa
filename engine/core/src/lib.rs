// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workforce Core
//!
//! Multi-tenant execution engine for business-owned workforce workers.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Owns workers and task runs inside a business boundary,
//!   gates execution behind the business autonomy policy, and records an
//!   append-only execution ledger plus per-business usage counters.

pub mod config;
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod runtime;

pub use domain::*;
