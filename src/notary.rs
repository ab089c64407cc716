//! # Report Notarization
//!
//! Tamper-evident report verification. Notarization hashes the exact
//! uploaded bytes with SHA-256, archives them in the blob store under the
//! hash, and records the hash in the database. Verification re-hashes the
//! presented bytes and looks the digest up; any single-byte change produces
//! a different digest and an unverified verdict.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::repositories::{NotarizeOutcome, ReportExportRepository};
use crate::storage::BlobStore;

/// Lowercase hex SHA-256 of a byte slice. The canonical report identity.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Result of notarizing an uploaded report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotarizedReport {
    /// Report export row ID
    pub id: Uuid,
    /// SHA-256 of the uploaded bytes
    pub content_hash: String,
    /// True when these bytes were already notarized earlier
    pub already_notarized: bool,
    /// Where the archived bytes live in the blob store
    pub storage_location: String,
    /// When the report was first notarized
    pub notarized_at: DateTime<FixedOffset>,
}

/// Verdict from verifying presented bytes against the archive.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerificationVerdict {
    /// SHA-256 of the presented bytes
    pub content_hash: String,
    /// True when the digest matches a notarized report
    pub verified: bool,
    /// When the matching report was notarized, if verified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notarized_at: Option<DateTime<FixedOffset>>,
    /// Platform of the matching report, if verified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// Notarization engine over the blob store and export repository.
#[derive(Clone)]
pub struct NotaryService {
    store: Arc<dyn BlobStore>,
    repo: ReportExportRepository,
}

impl NotaryService {
    /// Creates a new NotaryService instance
    pub fn new(store: Arc<dyn BlobStore>, repo: ReportExportRepository) -> Self {
        Self { store, repo }
    }

    /// Notarize uploaded report bytes.
    ///
    /// Archives the bytes first, then records the hash; if the database
    /// insert loses a race the existing row wins and the outcome reports
    /// the duplicate. Either way the caller gets the canonical record.
    pub async fn notarize(
        &self,
        org_id: Uuid,
        platform: &str,
        file_name: Option<String>,
        bytes: &[u8],
    ) -> Result<NotarizedReport> {
        let hash = content_hash(bytes);

        let storage_location = self.store.put(&hash, bytes).await?;

        let outcome = self
            .repo
            .record(
                org_id,
                &hash,
                &storage_location,
                platform,
                file_name,
                bytes.len() as i64,
            )
            .await?;

        let (model, already_notarized) = match outcome {
            NotarizeOutcome::Created(model) => (model, false),
            NotarizeOutcome::Existing(model) => (model, true),
        };

        tracing::info!(
            org_id = %org_id,
            content_hash = %hash,
            already_notarized,
            "Report notarized"
        );

        Ok(NotarizedReport {
            id: model.id,
            content_hash: model.content_hash,
            already_notarized,
            storage_location: model.storage_location,
            notarized_at: model.created_at,
        })
    }

    /// Verify presented bytes against the notarized archive.
    pub async fn verify(&self, bytes: &[u8]) -> Result<VerificationVerdict> {
        let hash = content_hash(bytes);
        self.verify_hash(&hash).await
    }

    /// Verify a precomputed digest against the notarized archive.
    pub async fn verify_hash(&self, hash: &str) -> Result<VerificationVerdict> {
        let found = self.repo.find_by_hash(hash).await?;

        Ok(match found {
            Some(model) => VerificationVerdict {
                content_hash: hash.to_string(),
                verified: true,
                notarized_at: Some(model.created_at),
                platform: Some(model.platform),
            },
            None => VerificationVerdict {
                content_hash: hash.to_string(),
                verified: false,
                notarized_at: None,
                platform: None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_lowercase_hex_sha256() {
        // SHA-256 of the empty string is a well-known vector
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(content_hash(b"").len(), 64);
    }

    #[test]
    fn test_single_byte_change_diverges() {
        let a = content_hash(b"quarterly report v1");
        let b = content_hash(b"quarterly report v2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(content_hash(b"same bytes"), content_hash(b"same bytes"));
    }
}
