// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Score-grouped endpoint lists, one per registry key.

use skynet_core::Endpoint;

/// All endpoints of equal locality score under one registry key. Group
/// lists are kept sorted by descending score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreGroup {
    pub score: u8,
    pub endpoints: Vec<Endpoint>,
}

/// Insert an endpoint into its score group, preserving descending score
/// order. Duplicate endpoints within a group are idempotent.
pub(crate) fn add_to_groups(groups: &mut Vec<ScoreGroup>, score: u8, endpoint: Endpoint) {
    match groups.iter_mut().find(|g| g.score == score) {
        Some(group) => {
            if !group.endpoints.contains(&endpoint) {
                group.endpoints.push(endpoint);
            }
        }
        None => {
            let at = groups.iter().position(|g| g.score < score).unwrap_or(groups.len());
            groups.insert(at, ScoreGroup { score, endpoints: vec![endpoint] });
        }
    }
}

/// Remove an endpoint from its group; drop the group when it empties.
/// Returns whether the endpoint was present.
pub(crate) fn remove_from_groups(groups: &mut Vec<ScoreGroup>, endpoint: &Endpoint) -> bool {
    let mut removed = false;
    for group in groups.iter_mut() {
        if let Some(at) = group.endpoints.iter().position(|e| e == endpoint) {
            group.endpoints.remove(at);
            removed = true;
        }
    }
    groups.retain(|g| !g.endpoints.is_empty());
    removed
}
