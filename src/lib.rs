// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Backend Common - shared plumbing for HTTP microservices
//!
//! The core is the authentication resolution pipeline: bearer token to
//! external identity (token cache, identity provider), external identity to
//! consumer or back-office principal (principal cache, relational store),
//! and the admin guard on top.
//!
//! ## Modules
//!
//! - `api` - Reference HTTP surface (Axum) with OpenAPI docs
//! - `auth` - Authentication pipeline, caches, middleware and extractors
//! - `config` - Environment-driven settings
//! - `error` - JSON error responses
//! - `logging` - Tracing subscriber and panic hook
//! - `middleware` - Request ids, request span, response logging, panic boundary
//! - `store` - Principal store implementations (Postgres, in-memory)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod state;
pub mod store;
