// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::AuthPipeline;
use crate::config::ServiceInfo;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthPipeline>,
    pub service: ServiceInfo,
}

impl AppState {
    pub fn new(auth: AuthPipeline, service: ServiceInfo) -> Self {
        Self {
            auth: Arc::new(auth),
            service,
        }
    }
}
