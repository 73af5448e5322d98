//! Fuzzy dependency-name resolution.
//!
//! Decomposition output frequently states dependencies with slightly wrong
//! names - wrong case, or underscore tokens in the wrong order. This resolves
//! a stated name against the known component id set without ever guessing a
//! partial match.

use std::collections::BTreeMap;

/// Resolve a free-text dependency reference against known component ids.
///
/// Resolution order:
/// 1. exact case-insensitive match wins outright
/// 2. underscore-token multiset match ("transposition", e.g.
///    `schemas_shaping` ↔ `shaping_schemas`)
/// 3. no match - never a partial or substring guess
pub fn normalize_dependency_name(stated: &str, known_ids: &[String]) -> Option<String> {
    let stated_lower = stated.to_lowercase();

    for id in known_ids {
        if id.to_lowercase() == stated_lower {
            return Some(id.clone());
        }
    }

    let stated_tokens = token_counts(&stated_lower);
    for id in known_ids {
        if token_counts(&id.to_lowercase()) == stated_tokens {
            return Some(id.clone());
        }
    }

    None
}

/// Multiset of underscore-delimited tokens.
fn token_counts(name: &str) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for token in name.split('_').filter(|t| !t.is_empty()) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}
