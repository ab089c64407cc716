//! # Identity Resolution
//!
//! Maps raw platform handles from webhook payloads onto internal profiles.
//! Matching is case-insensitive and tolerant of the legacy bare-string
//! identity format. A rename override table, loaded from an operator-managed
//! JSON file, canonicalizes old handles before matching.
//!
//! Resolution never fails a request: an unmatched or ambiguous handle
//! produces an anonymous verdict and the event is still recorded.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::profile;

/// Rename override table keyed by (platform, lowercase old handle).
///
/// File format:
/// ```json
/// { "github": { "old-handle": "new-handle" }, "slack": { "U0OLD": "U0NEW" } }
/// ```
#[derive(Debug, Clone, Default)]
pub struct IdentityOverrides {
    map: HashMap<(String, String), String>,
}

impl IdentityOverrides {
    /// An empty override table (no file configured).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load overrides from the configured JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read identity overrides from {:?}", path))?;
        let parsed: HashMap<String, HashMap<String, String>> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid identity overrides JSON in {:?}", path))?;

        let mut map = HashMap::new();
        for (platform, renames) in parsed {
            for (old_handle, canonical) in renames {
                map.insert(
                    (platform.to_lowercase(), old_handle.to_lowercase()),
                    canonical,
                );
            }
        }

        tracing::info!(count = map.len(), path = ?path, "Loaded identity overrides");
        Ok(Self { map })
    }

    /// Canonicalize a handle, following at most one rename hop.
    pub fn canonicalize<'a>(&'a self, platform: &str, handle: &'a str) -> &'a str {
        self.map
            .get(&(platform.to_lowercase(), handle.to_lowercase()))
            .map(String::as_str)
            .unwrap_or(handle)
    }
}

/// Outcome of resolving a raw handle against the profile working set.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributionVerdict {
    /// Matched internal profile, or None for anonymous attribution
    pub profile_id: Option<Uuid>,
    /// Canonical handle after override application
    pub canonical_handle: String,
}

/// Extract the handle from a platform identity entry.
///
/// Entries are either structured objects with a `handle` field or legacy
/// bare-string handles.
pub fn handle_from_identity(value: &JsonValue) -> Option<&str> {
    match value {
        JsonValue::String(handle) => Some(handle.as_str()),
        JsonValue::Object(obj) => obj.get("handle").and_then(JsonValue::as_str),
        _ => None,
    }
}

/// Resolve a raw platform handle to a profile within the working set.
///
/// Ambiguity (two profiles claiming the same handle) resolves to the lowest
/// profile ID for determinism, with a warning for operators to clean up.
pub fn resolve_actor(
    profiles: &[profile::Model],
    overrides: &IdentityOverrides,
    platform: &str,
    raw_handle: &str,
) -> AttributionVerdict {
    let canonical = overrides.canonicalize(platform, raw_handle);
    let needle = canonical.to_lowercase();

    let mut matches: Vec<Uuid> = profiles
        .iter()
        .filter_map(|p| {
            let identities = p.platform_identities.as_ref()?.as_object()?;
            let identity = identities.get(platform)?;
            let handle = handle_from_identity(identity)?;
            (handle.to_lowercase() == needle).then_some(p.id)
        })
        .collect();

    matches.sort();

    if matches.len() > 1 {
        tracing::warn!(
            platform,
            handle = canonical,
            candidates = matches.len(),
            "Ambiguous platform handle; attributing to lowest profile ID"
        );
    }

    AttributionVerdict {
        profile_id: matches.first().copied(),
        canonical_handle: canonical.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn profile_with_identities(id_byte: u8, identities: JsonValue) -> profile::Model {
        profile::Model {
            id: Uuid::from_bytes([id_byte; 16]),
            org_id: Uuid::new_v4(),
            display_name: format!("user-{}", id_byte),
            email: None,
            platform_identities: Some(identities),
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_structured_identity_matches() {
        let profiles = vec![profile_with_identities(
            1,
            json!({ "github": { "handle": "octocat" } }),
        )];

        let verdict = resolve_actor(&profiles, &IdentityOverrides::empty(), "github", "octocat");
        assert_eq!(verdict.profile_id, Some(Uuid::from_bytes([1; 16])));
    }

    #[test]
    fn test_legacy_bare_string_identity_matches() {
        let profiles = vec![profile_with_identities(1, json!({ "github": "octocat" }))];

        let verdict = resolve_actor(&profiles, &IdentityOverrides::empty(), "github", "octocat");
        assert_eq!(verdict.profile_id, Some(Uuid::from_bytes([1; 16])));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let profiles = vec![profile_with_identities(
            1,
            json!({ "github": { "handle": "OctoCat" } }),
        )];

        let verdict = resolve_actor(&profiles, &IdentityOverrides::empty(), "github", "OCTOCAT");
        assert_eq!(verdict.profile_id, Some(Uuid::from_bytes([1; 16])));
    }

    #[test]
    fn test_unmatched_handle_is_anonymous() {
        let profiles = vec![profile_with_identities(
            1,
            json!({ "github": { "handle": "octocat" } }),
        )];

        let verdict = resolve_actor(&profiles, &IdentityOverrides::empty(), "github", "stranger");
        assert_eq!(verdict.profile_id, None);
        assert_eq!(verdict.canonical_handle, "stranger");
    }

    #[test]
    fn test_wrong_platform_does_not_match() {
        let profiles = vec![profile_with_identities(
            1,
            json!({ "slack": { "handle": "octocat" } }),
        )];

        let verdict = resolve_actor(&profiles, &IdentityOverrides::empty(), "github", "octocat");
        assert_eq!(verdict.profile_id, None);
    }

    #[test]
    fn test_ambiguous_handle_resolves_to_lowest_id() {
        let profiles = vec![
            profile_with_identities(9, json!({ "github": { "handle": "octocat" } })),
            profile_with_identities(2, json!({ "github": { "handle": "octocat" } })),
        ];

        let verdict = resolve_actor(&profiles, &IdentityOverrides::empty(), "github", "octocat");
        assert_eq!(verdict.profile_id, Some(Uuid::from_bytes([2; 16])));
    }

    #[test]
    fn test_override_canonicalizes_before_matching() {
        let mut overrides = IdentityOverrides::empty();
        overrides.map.insert(
            ("github".to_string(), "old-name".to_string()),
            "octocat".to_string(),
        );

        let profiles = vec![profile_with_identities(
            1,
            json!({ "github": { "handle": "octocat" } }),
        )];

        let verdict = resolve_actor(&profiles, &overrides, "github", "Old-Name");
        assert_eq!(verdict.profile_id, Some(Uuid::from_bytes([1; 16])));
        assert_eq!(verdict.canonical_handle, "octocat");
    }

    #[test]
    fn test_override_follows_single_hop_only() {
        let mut overrides = IdentityOverrides::empty();
        overrides.map.insert(
            ("github".to_string(), "a".to_string()),
            "b".to_string(),
        );
        overrides.map.insert(
            ("github".to_string(), "b".to_string()),
            "c".to_string(),
        );

        // a -> b, not a -> b -> c
        assert_eq!(overrides.canonicalize("github", "a"), "b");
    }

    #[test]
    fn test_load_overrides_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");
        std::fs::write(
            &path,
            r#"{ "github": { "Old-Handle": "new-handle" } }"#,
        )
        .unwrap();

        let overrides = IdentityOverrides::load(&path).unwrap();
        assert_eq!(overrides.canonicalize("github", "old-handle"), "new-handle");
        assert_eq!(overrides.canonicalize("github", "unrelated"), "unrelated");
    }
}
