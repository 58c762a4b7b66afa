// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::policy::AutonomyPolicy;

/// Unique identifier for a business (tenant root).
///
/// Every entity in the engine hangs off exactly one business; the id is the
/// isolation boundary for all reads, writes, policy and usage accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusinessId(pub Uuid);

impl BusinessId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for BusinessId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BusinessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tenant root. Owns all workers, task runs, ledger entries and usage
/// records transitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: BusinessId,
    pub name: String,
    pub policy: AutonomyPolicy,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Business {
    pub fn new(name: impl Into<String>, policy: AutonomyPolicy) -> Self {
        Self {
            id: BusinessId::new(),
            name: name.into(),
            policy,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}
