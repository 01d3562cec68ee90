// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in services.

use async_trait::async_trait;
use bson::Document;
use tokio::time::Duration;

use crate::service::{ServiceError, SkynetService};

/// Replies with whatever it was sent. The `sleep` method delays first by
/// the `seconds` parameter, which makes it a convenient timeout probe.
pub struct EchoService {
    version: String,
    region: String,
}

impl EchoService {
    pub fn new(region: impl Into<String>) -> Self {
        Self { version: "1".to_string(), region: region.into() }
    }

    pub fn with_version(version: impl Into<String>, region: impl Into<String>) -> Self {
        Self { version: version.into(), region: region.into() }
    }
}

#[async_trait]
impl SkynetService for EchoService {
    fn service_name(&self) -> &str {
        "EchoService"
    }

    fn service_version(&self) -> &str {
        &self.version
    }

    fn service_region(&self) -> &str {
        &self.region
    }

    async fn dispatch(
        &self,
        method: &str,
        params: Document,
    ) -> Result<Option<Document>, ServiceError> {
        match method {
            "echo" => Ok(Some(params)),
            "sleep" => {
                let seconds = params
                    .get_f64("seconds")
                    .ok()
                    .or_else(|| params.get_i64("seconds").ok().map(|s| s as f64))
                    .unwrap_or(0.0);
                tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
                Ok(Some(params))
            }
            other => Err(ServiceError::unknown_method(self.service_name(), other)),
        }
    }
}
