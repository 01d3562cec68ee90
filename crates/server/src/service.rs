// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The service contract.
//!
//! A service is an explicit object: it names itself and resolves its own
//! methods. Registration is a call on the server, never a side effect of
//! defining a type.

use async_trait::async_trait;
use bson::Document;
use thiserror::Error;

/// A handler failure, shipped to the caller as an exception reply.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ServiceError {
    /// Exception class name as the caller sees it.
    pub class: String,
    pub message: String,
    pub backtrace: Vec<String>,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_class("ServiceError", message)
    }

    pub fn with_class(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self { class: class.into(), message: message.into(), backtrace: Vec::new() }
    }

    /// The conventional failure for a method the service does not expose.
    pub fn unknown_method(service: &str, method: &str) -> Self {
        Self::with_class(
            "NoMethodError",
            format!("undefined method {:?} for service {:?}", method, service),
        )
    }
}

/// A named, versioned, regioned handler set reachable by RPC.
///
/// `dispatch` may itself make RPC calls; each connection handler runs on
/// its own task. Returning `Ok(None)` tells the server to close the
/// caller's connection after this request.
#[async_trait]
pub trait SkynetService: Send + Sync {
    fn service_name(&self) -> &str;

    fn service_version(&self) -> &str;

    fn service_region(&self) -> &str;

    async fn dispatch(
        &self,
        method: &str,
        params: Document,
    ) -> Result<Option<Document>, ServiceError>;
}

/// Check the parts of the contract the type system cannot: names must be
/// non-empty and survive embedding in a `servicemethod` and a store path.
pub(crate) fn validate(service: &dyn SkynetService) -> Result<(), String> {
    let name = service.service_name();
    if name.is_empty() {
        return Err("service name is empty".to_string());
    }
    if name.contains('.') || name.contains('/') {
        return Err(format!("service name {:?} contains a reserved character", name));
    }
    if service.service_version().is_empty() {
        return Err(format!("service {:?} has an empty version", name));
    }
    if service.service_region().is_empty() {
        return Err(format!("service {:?} has an empty region", name));
    }
    Ok(())
}
