//! AEAD helpers for encrypting LMS tokens at rest.
//!
//! The process-wide key is loaded once at startup (see `state::AppState`)
//! and held read-only for the process lifetime — there is no rotation
//! support beyond the single active key the design note accepts as the
//! current scope.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("failed to encrypt token")]
    EncryptFailed,
    #[error("failed to decrypt token: ciphertext invalid or key mismatch")]
    DecryptFailed,
}

/// Encrypts `plaintext` under `key`, returning `nonce || ciphertext` as a
/// single byte vector so only one column is needed to store both.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::EncryptFailed)?;
    let mut out = nonce.to_vec();
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts a blob produced by [`encrypt`]. The plaintext is returned to the
/// caller's stack and must not be persisted or logged; callers should keep
/// it scoped to a single request.
pub fn decrypt(key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    const NONCE_LEN: usize = 12;
    if blob.len() < NONCE_LEN {
        return Err(CryptoError::DecryptFailed);
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let key = test_key();
        let plaintext = b"moodle-ws-token-abc123";
        let ciphertext = encrypt(&key, plaintext).unwrap();
        let recovered = decrypt(&key, &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn ciphertext_does_not_contain_plaintext() {
        let key = test_key();
        let plaintext = b"moodle-ws-token-abc123";
        let ciphertext = encrypt(&key, plaintext).unwrap();
        assert!(!ciphertext.windows(plaintext.len()).any(|w| w == plaintext));
    }

    #[test]
    fn decrypt_fails_with_wrong_key() {
        let ciphertext = encrypt(&test_key(), b"token").unwrap();
        let wrong_key = [9u8; 32];
        assert!(decrypt(&wrong_key, &ciphertext).is_err());
    }

    #[test]
    fn decrypt_fails_on_truncated_blob() {
        let key = test_key();
        assert!(decrypt(&key, b"short").is_err());
    }

    #[test]
    fn two_encryptions_of_same_plaintext_differ() {
        let key = test_key();
        let a = encrypt(&key, b"token").unwrap();
        let b = encrypt(&key, b"token").unwrap();
        assert_ne!(a, b, "random nonce must make ciphertexts differ");
    }
}
