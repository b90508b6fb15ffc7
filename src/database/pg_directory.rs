//! PostgreSQL identity directory and authorization gateway over the
//! `users`, `roles`, `user_roles`, `permissions` and `role_permissions`
//! tables.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashSet;

use crate::error::{ReviewError, Result};
use crate::gateway::{AuthorizationGateway, IdentityDirectory};

#[derive(Debug, Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityDirectory for PgDirectory {
    async fn roles_of(&self, user_id: i64) -> Result<HashSet<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT role_id FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(role_id,)| role_id).collect())
    }

    async fn users_in_role(&self, role_id: i64) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT user_id FROM user_roles WHERE role_id = $1 ORDER BY user_id")
                .bind(role_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(user_id,)| user_id).collect())
    }

    async fn role_exists(&self, role_id: i64) -> Result<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM roles WHERE role_id = $1)")
                .bind(role_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn user_exists(&self, user_id: i64) -> Result<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn display_name(&self, user_id: i64) -> Result<String> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT display_name FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(name,)| name)
            .ok_or_else(|| ReviewError::not_found("user", user_id))
    }
}

#[async_trait]
impl AuthorizationGateway for PgDirectory {
    async fn has_permission(&self, role_id: i64, permission: &str) -> Result<bool> {
        let (granted,): (bool,) = sqlx::query_as(
            "SELECT EXISTS ( \
                 SELECT 1 FROM role_permissions rp \
                 INNER JOIN permissions p ON p.permission_id = rp.permission_id \
                 WHERE rp.role_id = $1 AND p.name = $2)",
        )
        .bind(role_id)
        .bind(permission)
        .fetch_one(&self.pool)
        .await?;
        Ok(granted)
    }
}
