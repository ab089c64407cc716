//! Token vault using AES-256-GCM
//!
//! Encrypts third-party credentials at rest into a self-describing string
//! envelope `vault:v1:<iv>:<tag>:<ciphertext>` (all hex). The 256-bit key is
//! derived from the configured master secret with SHA-256. Additional
//! authenticated data (AAD) binds each ciphertext to its owning integration.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::models::integration::Model as IntegrationModel;

const ENVELOPE_PREFIX: &str = "vault:v1:";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Fixed key material used when no master secret is configured. Only
/// acceptable in local development; never in production profiles.
const DEV_FALLBACK_SECRET: &str = "veritas-dev-only-insecure-master-key";

/// Vault error types
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid envelope format")]
    InvalidFormat,
}

/// Secure wrapper for the derived encryption key with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

impl ZeroizingKey {
    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypts and decrypts credential envelopes.
#[derive(Debug, Clone)]
pub struct TokenVault {
    key: ZeroizingKey,
}

impl TokenVault {
    /// Build a vault from the configured master secret.
    ///
    /// When no secret is configured a fixed development key is used and a
    /// warning is logged. Production profiles reject a missing secret at
    /// config validation time, so this path only runs in local/test.
    pub fn from_master_secret(master_secret: Option<&str>) -> Self {
        let secret = match master_secret {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!(
                    "No vault master key configured; using insecure development key. \
                     Set VRTS_VAULT_MASTER_KEY before storing real credentials."
                );
                DEV_FALLBACK_SECRET
            }
        };

        let digest = Sha256::digest(secret.as_bytes());
        Self {
            key: ZeroizingKey(digest.to_vec()),
        }
    }

    /// Returns true if the value carries the vault envelope marker.
    pub fn is_envelope(value: &str) -> bool {
        value.starts_with(ENVELOPE_PREFIX)
    }

    /// Encrypt a plaintext credential into an envelope string.
    ///
    /// Encrypting an existing envelope is an idempotent no-op so callers can
    /// safely re-run migrations or double-save without nesting ciphertexts.
    pub fn encrypt_string(&self, aad: &[u8], plaintext: &str) -> Result<String, VaultError> {
        if Self::is_envelope(plaintext) {
            return Ok(plaintext.to_string());
        }

        let cipher_key = Key::<Aes256Gcm>::from_slice(self.key.as_bytes());
        let cipher = Aes256Gcm::new(cipher_key);

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext_and_tag = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad,
                },
            )
            .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

        // aes-gcm appends the tag to the ciphertext; the envelope carries
        // them as separate fields
        let split_at = ciphertext_and_tag.len() - TAG_LEN;
        let (ciphertext, tag) = ciphertext_and_tag.split_at(split_at);

        Ok(format!(
            "{}{}:{}:{}",
            ENVELOPE_PREFIX,
            hex::encode(nonce),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt an envelope string back into the plaintext credential.
    ///
    /// Values without the envelope marker are treated as legacy plaintext and
    /// returned unchanged.
    pub fn decrypt_string(&self, aad: &[u8], value: &str) -> Result<String, VaultError> {
        let Some(body) = value.strip_prefix(ENVELOPE_PREFIX) else {
            return Ok(value.to_string());
        };

        let mut parts = body.splitn(3, ':');
        let (Some(iv_hex), Some(tag_hex), Some(ct_hex)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(VaultError::InvalidFormat);
        };

        let iv = hex::decode(iv_hex).map_err(|_| VaultError::InvalidFormat)?;
        let tag = hex::decode(tag_hex).map_err(|_| VaultError::InvalidFormat)?;
        let ciphertext = hex::decode(ct_hex).map_err(|_| VaultError::InvalidFormat)?;

        if iv.len() != NONCE_LEN || tag.len() != TAG_LEN {
            return Err(VaultError::InvalidFormat);
        }

        let nonce = Nonce::from_slice(&iv);

        let mut ciphertext_and_tag = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        ciphertext_and_tag.extend_from_slice(&ciphertext);
        ciphertext_and_tag.extend_from_slice(&tag);

        let cipher_key = Key::<Aes256Gcm>::from_slice(self.key.as_bytes());
        let cipher = Aes256Gcm::new(cipher_key);

        let plaintext = cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &ciphertext_and_tag,
                    aad,
                },
            )
            .map_err(|e| VaultError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| VaultError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
    }
}

/// AAD binding a credential to its owning integration.
fn integration_aad(integration: &IntegrationModel) -> String {
    format!("{}|{}", integration.org_id, integration.provider)
}

/// Type alias for encrypted token result
type EncryptedTokens = Result<(Option<String>, Option<String>), VaultError>;

/// Encrypt tokens for an integration model
pub fn encrypt_integration_tokens(
    vault: &TokenVault,
    integration: &IntegrationModel,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
) -> EncryptedTokens {
    let aad = integration_aad(integration);

    let encrypted_access_token = access_token
        .map(|token| vault.encrypt_string(aad.as_bytes(), token))
        .transpose()?;

    let encrypted_refresh_token = refresh_token
        .map(|token| vault.encrypt_string(aad.as_bytes(), token))
        .transpose()?;

    Ok((encrypted_access_token, encrypted_refresh_token))
}

/// Type alias for decrypted token result
type DecryptedTokens = Result<(Option<String>, Option<String>), VaultError>;

/// Decrypt tokens for an integration model
pub fn decrypt_integration_tokens(
    vault: &TokenVault,
    integration: &IntegrationModel,
) -> DecryptedTokens {
    let aad = integration_aad(integration);

    let decrypted_access_token = integration
        .access_token_ciphertext
        .as_deref()
        .map(|token| vault.decrypt_string(aad.as_bytes(), token))
        .transpose()?;

    let decrypted_refresh_token = integration
        .refresh_token_ciphertext
        .as_deref()
        .map(|token| vault.decrypt_string(aad.as_bytes(), token))
        .transpose()?;

    Ok((decrypted_access_token, decrypted_refresh_token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn test_vault() -> TokenVault {
        TokenVault::from_master_secret(Some("test-master-secret"))
    }

    fn sample_integration(
        access_token_ciphertext: Option<String>,
        refresh_token_ciphertext: Option<String>,
    ) -> IntegrationModel {
        IntegrationModel {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            provider: "github".to_string(),
            access_token_ciphertext,
            refresh_token_ciphertext,
            expires_in: None,
            refresh_token_expires_in: None,
            token_issued_at: None,
            installation_id: None,
            username: None,
            scope: None,
            status: "active".to_string(),
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let vault = test_vault();
        let aad = b"org|github";

        let envelope = vault
            .encrypt_string(aad, "ghu_secret_token")
            .expect("encryption succeeds");
        assert!(TokenVault::is_envelope(&envelope));

        let decrypted = vault
            .decrypt_string(aad, &envelope)
            .expect("decryption succeeds");
        assert_eq!(decrypted, "ghu_secret_token");
    }

    #[test]
    fn test_envelope_has_expected_shape() {
        let vault = test_vault();
        let envelope = vault
            .encrypt_string(b"aad", "secret")
            .expect("encryption succeeds");

        let body = envelope.strip_prefix("vault:v1:").expect("prefix present");
        let parts: Vec<&str> = body.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), NONCE_LEN * 2); // iv hex
        assert_eq!(parts[1].len(), TAG_LEN * 2); // tag hex
    }

    #[test]
    fn test_double_encrypt_is_idempotent() {
        let vault = test_vault();
        let aad = b"aad";

        let once = vault.encrypt_string(aad, "secret").expect("first encrypt");
        let twice = vault.encrypt_string(aad, &once).expect("second encrypt");

        assert_eq!(once, twice);
        assert_eq!(vault.decrypt_string(aad, &twice).unwrap(), "secret");
    }

    #[test]
    fn test_legacy_plaintext_passthrough() {
        let vault = test_vault();
        let result = vault
            .decrypt_string(b"aad", "legacy-plaintext-token")
            .expect("legacy plaintext is returned");
        assert_eq!(result, "legacy-plaintext-token");
    }

    #[test]
    fn test_different_aad_fails() {
        let vault = test_vault();

        let envelope = vault
            .encrypt_string(b"aad-1", "secret")
            .expect("encryption succeeds");
        let result = vault.decrypt_string(b"aad-2", &envelope);

        assert!(matches!(result, Err(VaultError::DecryptionFailed(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let vault = test_vault();
        let aad = b"aad";

        let envelope = vault.encrypt_string(aad, "secret").expect("encryption");
        // Flip one hex digit in the ciphertext segment
        let mut chars: Vec<char> = envelope.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();

        let result = vault.decrypt_string(aad, &tampered);
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_envelope_rejected() {
        let vault = test_vault();

        let missing_parts = vault.decrypt_string(b"aad", "vault:v1:deadbeef");
        assert!(matches!(missing_parts, Err(VaultError::InvalidFormat)));

        let bad_hex = vault.decrypt_string(b"aad", "vault:v1:zz:zz:zz");
        assert!(matches!(bad_hex, Err(VaultError::InvalidFormat)));
    }

    #[test]
    fn test_nonce_uniqueness() {
        let vault = test_vault();
        let aad = b"aad";

        let first = vault.encrypt_string(aad, "secret").expect("encryption");
        let second = vault.encrypt_string(aad, "secret").expect("encryption");

        assert_ne!(first, second);
        assert_eq!(vault.decrypt_string(aad, &first).unwrap(), "secret");
        assert_eq!(vault.decrypt_string(aad, &second).unwrap(), "secret");
    }

    #[test]
    fn test_dev_fallback_key_roundtrip() {
        let vault = TokenVault::from_master_secret(None);
        let envelope = vault.encrypt_string(b"aad", "secret").expect("encryption");
        assert_eq!(vault.decrypt_string(b"aad", &envelope).unwrap(), "secret");

        // Different master secrets produce incompatible vaults
        let other = test_vault();
        assert!(other.decrypt_string(b"aad", &envelope).is_err());
    }

    #[test]
    fn test_integration_token_helpers() {
        let vault = test_vault();
        let mut integration = sample_integration(None, None);

        let (access, refresh) = encrypt_integration_tokens(
            &vault,
            &integration,
            Some("access-token"),
            Some("refresh-token"),
        )
        .expect("encryption succeeds");

        integration.access_token_ciphertext = access;
        integration.refresh_token_ciphertext = refresh;

        assert!(TokenVault::is_envelope(
            integration.access_token_ciphertext.as_deref().unwrap()
        ));

        let (access, refresh) =
            decrypt_integration_tokens(&vault, &integration).expect("decryption succeeds");
        assert_eq!(access.as_deref(), Some("access-token"));
        assert_eq!(refresh.as_deref(), Some("refresh-token"));
    }
}
