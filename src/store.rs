// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Principal store implementations.
//!
//! - [`PgPrincipalStore`] - Postgres, used in deployed services
//! - [`InMemoryPrincipalStore`] - local development and tests

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::RwLock;

use crate::auth::resolver::{PrincipalRow, PrincipalStore, PrincipalTable, StoreError};

/// Postgres-backed principal store.
#[derive(Clone)]
pub struct PgPrincipalStore {
    pool: PgPool,
}

impl PgPrincipalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a lazily connecting pool; no connection is opened until the
    /// first query.
    pub fn connect_lazy(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(url)?;
        Ok(Self::new(pool))
    }
}

fn lookup_sql(table: &PrincipalTable) -> String {
    format!(
        "SELECT id::bigint AS id, COALESCE({flag}, false) AS flag FROM {schema}.{table} WHERE email = $1 LIMIT 1",
        flag = table.flag_column,
        schema = table.schema,
        table = table.table,
    )
}

#[async_trait]
impl PrincipalStore for PgPrincipalStore {
    async fn find_by_email(
        &self,
        table: &PrincipalTable,
        email: &str,
    ) -> Result<Option<PrincipalRow>, StoreError> {
        let sql = lookup_sql(table);
        let row = sqlx::query_as::<_, (i64, bool)>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(id, flag)| {
            let id = u64::try_from(id).map_err(|_| {
                StoreError::InvalidRow(format!(
                    "negative id {id} in {}",
                    table.qualified_name()
                ))
            })?;
            Ok(PrincipalRow { id, flag })
        })
        .transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// In-memory principal store keyed by `(schema.table, email)`.
#[derive(Default)]
pub struct InMemoryPrincipalStore {
    rows: RwLock<HashMap<(String, String), PrincipalRow>>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, table: &PrincipalTable, email: &str, id: u64, flag: bool) {
        self.rows
            .write()
            .await
            .insert((table.qualified_name(), email.to_string()), PrincipalRow { id, flag });
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn find_by_email(
        &self,
        table: &PrincipalTable,
        email: &str,
    ) -> Result<Option<PrincipalRow>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(&(table.qualified_name(), email.to_string()))
            .copied())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
