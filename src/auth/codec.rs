use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

use crate::auth::token::TokenKind;
use crate::error::AccountError;

/// Delimiter joining the fields inside a handle's plaintext. Field values
/// must never contain it.
const FIELD_DELIMITER: char = '#';

/// AES-GCM nonce length; the nonce is prepended to the ciphertext before
/// encoding.
const NONCE_LEN: usize = 12;

/// The decrypted contents of a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHandle {
    pub user_id: String,
    pub kind: TokenKind,
    pub value: String,
}

/// Reversible encryption of `(user_id, kind, value)` into a URL-safe
/// opaque handle for emailed links.
///
/// The plaintext is the three fields joined by `#`, sealed with AES-256-GCM
/// under a key derived from the configured secret, and encoded base64
/// URL-safe without padding. Handles are stateless and may be re-decoded
/// freely; single use comes from deleting the stored token, not from the
/// handle.
#[derive(Clone)]
pub struct TokenCodec {
    cipher: Aes256Gcm,
}

impl TokenCodec {
    /// Build a codec from the configured secret string. The encryption key
    /// is the SHA-256 digest of the secret, so secrets of any length work.
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(digest.as_slice());
        TokenCodec {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Seal a token tuple into a handle.
    pub fn encode(
        &self,
        user_id: &str,
        kind: TokenKind,
        value: &str,
    ) -> Result<String, AccountError> {
        for field in [user_id, value] {
            if field.is_empty() {
                return Err(AccountError::Encode("empty field".to_string()));
            }
            if field.contains(FIELD_DELIMITER) {
                return Err(AccountError::Encode(format!(
                    "field contains the reserved '{}' delimiter",
                    FIELD_DELIMITER
                )));
            }
        }

        let plaintext = format!(
            "{}{sep}{}{sep}{}",
            user_id,
            kind.as_str(),
            value,
            sep = FIELD_DELIMITER
        );
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| AccountError::Encode("encryption failed".to_string()))?;

        let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(nonce.as_slice());
        raw.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Open a handle back into its token tuple.
    ///
    /// Fails with [`AccountError::Decode`] if the base64 wrapping, the
    /// authentication tag, or the payload shape (exactly three non-empty
    /// fields, known kind) is off. Decoding says nothing about whether the
    /// token is still stored or live.
    pub fn decode(&self, handle: &str) -> Result<DecodedHandle, AccountError> {
        let raw = URL_SAFE_NO_PAD
            .decode(handle)
            .map_err(|_| AccountError::Decode("handle is not valid base64".to_string()))?;
        if raw.len() <= NONCE_LEN {
            return Err(AccountError::Decode("handle is too short".to_string()));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| AccountError::Decode("decryption failed".to_string()))?;
        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| AccountError::Decode("payload is not valid UTF-8".to_string()))?;

        let fields: Vec<&str> = plaintext.split(FIELD_DELIMITER).collect();
        if fields.len() != 3 || fields.iter().any(|f| f.is_empty()) {
            return Err(AccountError::Decode(
                "payload must hold exactly three non-empty fields".to_string(),
            ));
        }
        let kind = TokenKind::parse(fields[1])
            .ok_or_else(|| AccountError::Decode(format!("unknown token kind '{}'", fields[1])))?;

        Ok(DecodedHandle {
            user_id: fields[0].to_string(),
            kind,
            value: fields[2].to_string(),
        })
    }
}
