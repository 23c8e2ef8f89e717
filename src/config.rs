// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Settings are read once from the environment at startup by
//! [`Settings::from_env`]. Tests build them from any lookup function with
//! [`Settings::from_lookup`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `SERVICE_NAME` | Service name attached to the request span | `backend-common` |
//! | `ENVIRONMENT` | Deployment environment attached to the request span | `local` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `REQUEST_TIMEOUT_SECS` | Whole-request deadline | `30` |
//! | `UPSTREAM_TIMEOUT_SECS` | Deadline per identity/store call | `10` |
//! | `TOKEN_CACHE_TTL_SECS` | Token cache entry lifetime | `1200` |
//! | `TOKEN_CACHE_CAPACITY` | Token cache bound per realm | `100000` |
//! | `PRINCIPAL_CACHE_TTL_SECS` | Principal cache entry lifetime | `1200` |
//! | `PRINCIPAL_CACHE_CAPACITY` | Principal cache bound per namespace | `100000` |
//! | `PUBLIC_PATHS` | Comma separated path prefixes that skip auth | `/health,/docs,/api-doc` |
//! | `CONSUMER_PROJECT_ID` | Identity project for consumers | Required |
//! | `BACKOFFICE_PROJECT_ID` | Identity project for back-office users | Required |
//! | `IDENTITY_JWKS_URL` | Signing key set endpoint | Google securetoken JWKS |
//! | `IDENTITY_LOOKUP_URL` | Identity Toolkit base URL | `https://identitytoolkit.googleapis.com/v1` |
//! | `IDENTITY_ADMIN_TOKEN` | Bearer credential for user record lookups | Optional |
//! | `DATABASE_URL` | Postgres URL; unset selects an empty in-memory store | Optional |
//! | `DATABASE_MAX_CONNECTIONS` | Connection pool size | `10` |
//! | `CONSUMER_TABLE` | `schema.table` holding consumers | `consumers.consumers` |
//! | `BACKOFFICE_TABLE` | `schema.table` holding back-office users | `traders.traders` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::firebase::{FirebaseConfig, IDENTITY_TOOLKIT_URL};
use crate::auth::jwks::FIREBASE_JWKS_URL;
use crate::auth::pipeline::CacheSettings;
use crate::auth::resolver::{PrincipalTable, StoreError};
use crate::logging::LogFormat;

const DEFAULT_PUBLIC_PATHS: &str = "/health,/docs,/api-doc";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("invalid table for {name}: {source}")]
    Table {
        name: &'static str,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
}

impl ServerSettings {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: "HOST",
                value: self.host.clone(),
            })
    }
}

/// Service identity attached to every request span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub caches: CacheSettings,
    pub upstream_timeout: Duration,
    pub public_paths: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub consumer_project_id: String,
    pub backoffice_project_id: String,
    pub jwks_url: String,
    pub lookup_url: String,
    pub admin_token: Option<String>,
}

impl IdentitySettings {
    pub fn consumer(&self) -> FirebaseConfig {
        self.project(&self.consumer_project_id)
    }

    pub fn backoffice(&self) -> FirebaseConfig {
        self.project(&self.backoffice_project_id)
    }

    fn project(&self, project_id: &str) -> FirebaseConfig {
        FirebaseConfig {
            project_id: project_id.to_string(),
            jwks_url: self.jwks_url.clone(),
            lookup_url: self.lookup_url.clone(),
            admin_token: self.admin_token.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: u32,
    pub consumer_table: PrincipalTable,
    pub backoffice_table: PrincipalTable,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub service: ServiceInfo,
    pub log_format: LogFormat,
    pub auth: AuthSettings,
    pub identity: IdentitySettings,
    pub database: DatabaseSettings,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings from `lookup`, which returns the raw value of a variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = CacheSettings::default();

        let server = ServerSettings {
            host: env.string("HOST", "0.0.0.0"),
            port: env.parse("PORT", 8080)?,
            request_timeout: env.secs("REQUEST_TIMEOUT_SECS", 30)?,
        };

        let service = ServiceInfo {
            name: env.string("SERVICE_NAME", env!("CARGO_PKG_NAME")),
            environment: env.string("ENVIRONMENT", "local"),
        };

        let log_format = LogFormat::from_name(&env.string("LOG_FORMAT", "pretty"));

        let auth = AuthSettings {
            caches: CacheSettings {
                token_ttl: env.secs("TOKEN_CACHE_TTL_SECS", defaults.token_ttl.as_secs())?,
                token_capacity: env.parse("TOKEN_CACHE_CAPACITY", defaults.token_capacity)?,
                principal_ttl: env
                    .secs("PRINCIPAL_CACHE_TTL_SECS", defaults.principal_ttl.as_secs())?,
                principal_capacity: env
                    .parse("PRINCIPAL_CACHE_CAPACITY", defaults.principal_capacity)?,
            },
            upstream_timeout: env.secs("UPSTREAM_TIMEOUT_SECS", 10)?,
            public_paths: env
                .string("PUBLIC_PATHS", DEFAULT_PUBLIC_PATHS)
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
        };

        let identity = IdentitySettings {
            consumer_project_id: env.required("CONSUMER_PROJECT_ID")?,
            backoffice_project_id: env.required("BACKOFFICE_PROJECT_ID")?,
            jwks_url: env.string("IDENTITY_JWKS_URL", FIREBASE_JWKS_URL),
            lookup_url: env.string("IDENTITY_LOOKUP_URL", IDENTITY_TOOLKIT_URL),
            admin_token: env.optional("IDENTITY_ADMIN_TOKEN"),
        };

        let database = DatabaseSettings {
            url: env.optional("DATABASE_URL"),
            max_connections: env.parse("DATABASE_MAX_CONNECTIONS", 10)?,
            consumer_table: env.table("CONSUMER_TABLE", PrincipalTable::consumers())?,
            backoffice_table: env.table("BACKOFFICE_TABLE", PrincipalTable::traders())?,
        };

        Ok(Self {
            server,
            service,
            log_format,
            auth,
            identity,
            database,
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty trimmed value.
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(name) {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { name, value }),
            None => Ok(default),
        }
    }

    fn secs(&self, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
        let secs: u64 = self.parse(name, default)?;
        if secs == 0 {
            return Err(ConfigError::Invalid {
                name,
                value: secs.to_string(),
            });
        }
        Ok(Duration::from_secs(secs))
    }

    fn table(
        &self,
        name: &'static str,
        default: PrincipalTable,
    ) -> Result<PrincipalTable, ConfigError> {
        match self.optional(name) {
            Some(qualified) => PrincipalTable::parse(&qualified, &default.flag_column)
                .map_err(|source| ConfigError::Table { name, source }),
            None => Ok(default),
        }
    }
}
