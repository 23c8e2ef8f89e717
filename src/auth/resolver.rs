// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Principal resolution against the relational store.
//!
//! Each lookup is a single point query:
//!
//! ```sql
//! SELECT id, <flag> FROM <schema>.<table> WHERE email = $1
//! ```
//!
//! The table is picked by [`RequestContext`]. An empty result is not an
//! error; it resolves to a principal with `id == 0`.

use std::sync::Arc;

use async_trait::async_trait;

use super::context::RequestContext;
use super::principal::{BackofficePrincipal, ConsumerPrincipal, Principal};

/// Errors returned by a principal store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("invalid table identifier: {0}")]
    InvalidIdentifier(String),
}

/// A qualified table plus the boolean role column read from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalTable {
    pub schema: String,
    pub table: String,
    pub flag_column: String,
}

impl PrincipalTable {
    /// `consumers.consumers`, flag `is_guest`.
    pub fn consumers() -> Self {
        Self {
            schema: "consumers".to_string(),
            table: "consumers".to_string(),
            flag_column: "is_guest".to_string(),
        }
    }

    /// `traders.traders`, flag `is_admin`.
    pub fn traders() -> Self {
        Self {
            schema: "traders".to_string(),
            table: "traders".to_string(),
            flag_column: "is_admin".to_string(),
        }
    }

    /// Parse `schema.table` with the given flag column.
    ///
    /// Identifiers end up interpolated into SQL, so only ASCII letters,
    /// digits and underscores are accepted.
    pub fn parse(qualified: &str, flag_column: &str) -> Result<Self, StoreError> {
        let (schema, table) = qualified
            .split_once('.')
            .ok_or_else(|| StoreError::InvalidIdentifier(qualified.to_string()))?;

        for ident in [schema, table, flag_column] {
            if !is_valid_identifier(ident) {
                return Err(StoreError::InvalidIdentifier(ident.to_string()));
            }
        }

        Ok(Self {
            schema: schema.to_string(),
            table: table.to_string(),
            flag_column: flag_column.to_string(),
        })
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

fn is_valid_identifier(ident: &str) -> bool {
    !ident.is_empty()
        && !ident.starts_with(|c: char| c.is_ascii_digit())
        && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Row returned by a principal lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrincipalRow {
    pub id: u64,
    pub flag: bool,
}

/// Relational store collaborator.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Point lookup by email; `Ok(None)` when no row matches.
    async fn find_by_email(
        &self,
        table: &PrincipalTable,
        email: &str,
    ) -> Result<Option<PrincipalRow>, StoreError>;

    /// Connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Maps an email onto a consumer or back-office principal.
#[derive(Clone)]
pub struct PrincipalResolver {
    store: Arc<dyn PrincipalStore>,
    consumers: PrincipalTable,
    backoffice: PrincipalTable,
}

impl PrincipalResolver {
    pub fn new(store: Arc<dyn PrincipalStore>) -> Self {
        Self {
            store,
            consumers: PrincipalTable::consumers(),
            backoffice: PrincipalTable::traders(),
        }
    }

    /// Override the tables used for each context.
    pub fn with_tables(mut self, consumers: PrincipalTable, backoffice: PrincipalTable) -> Self {
        self.consumers = consumers;
        self.backoffice = backoffice;
        self
    }

    pub fn table(&self, context: RequestContext) -> &PrincipalTable {
        match context {
            RequestContext::Consumer => &self.consumers,
            RequestContext::Backoffice => &self.backoffice,
        }
    }

    pub fn store(&self) -> &Arc<dyn PrincipalStore> {
        &self.store
    }

    /// Resolve the principal for `email` in `context`.
    ///
    /// No matching row yields [`Principal::not_found`]; store failures are
    /// returned as errors and must not be cached by the caller.
    pub async fn resolve(
        &self,
        email: &str,
        context: RequestContext,
    ) -> Result<Principal, StoreError> {
        let row = self.store.find_by_email(self.table(context), email).await?;

        let principal = match (context, row) {
            (_, None) => Principal::not_found(context),
            (RequestContext::Consumer, Some(row)) => Principal::Consumer(ConsumerPrincipal {
                id: row.id,
                is_guest: row.flag,
            }),
            (RequestContext::Backoffice, Some(row)) => {
                Principal::Backoffice(BackofficePrincipal {
                    id: row.id,
                    is_admin: row.flag,
                })
            }
        };

        Ok(principal)
    }
}
