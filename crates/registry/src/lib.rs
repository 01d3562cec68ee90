// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! skynet-registry: a replicated, watched view of which
//! {service, version, region} tuples are running at which endpoints.
//!
//! Built on the watched store cache: instance-record events flow in as
//! callbacks and come out as a locality-ranked endpoint lookup.

mod index;
mod registry;
mod score;

pub use index::ScoreGroup;
pub use registry::{RegistryError, RegistryLayout, ServiceRegistry, ServiceUnavailable};
pub use score::locality_score;
