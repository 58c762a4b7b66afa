// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::business::{Business, BusinessId};
use crate::domain::repository::{BusinessRepository, RepositoryError};

pub struct PostgresBusinessRepository {
    pool: PgPool,
}

impl PostgresBusinessRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BusinessRepository for PostgresBusinessRepository {
    async fn save(&self, business: &Business) -> Result<(), RepositoryError> {
        let policy_json = serde_json::to_value(&business.policy)?;

        sqlx::query(
            r#"
            INSERT INTO businesses (id, name, policy, active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                policy = EXCLUDED.policy,
                active = EXCLUDED.active
            "#,
        )
        .bind(business.id.0)
        .bind(&business.name)
        .bind(policy_json)
        .bind(business.active)
        .bind(business.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: BusinessId) -> Result<Option<Business>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, policy, active, created_at
            FROM businesses
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let policy = serde_json::from_value(row.get("policy"))?;

        Ok(Some(Business {
            id: BusinessId(row.get("id")),
            name: row.get("name"),
            policy,
            active: row.get("active"),
            created_at: row.get("created_at"),
        }))
    }
}
