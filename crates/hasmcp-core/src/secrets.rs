//! Secret handling: AES-256-GCM field encryption, random state strings, and
//! token-at-rest hashing.
//!
//! Encryption uses a process-wide 32-byte key (hex in the configuration) and
//! a fresh 12-byte nonce per call; ciphertext and nonce are returned
//! separately because rows persist them in separate columns.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Required key size: 32 bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size.
pub const NONCE_SIZE: usize = 12;

const BCRYPT_MIN_COST: u32 = 4;

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("encryption key must be {KEY_SIZE} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption key is not valid hex")]
    InvalidKeyEncoding,
    #[error("encryption failed")]
    EncryptFailed,
    #[error("decryption failed: wrong key, nonce, or corrupted data")]
    DecryptFailed,
    #[error("random generator failure")]
    RngFailed,
    #[error("hashing failed: {0}")]
    HashFailed(String),
}

pub struct Secrets {
    key: LessSafeKey,
    rng: SystemRandom,
    salt: Vec<u8>,
}

impl Secrets {
    /// Fails when the hex-encoded key does not decode to exactly 32 bytes.
    pub fn new(encryption_key_hex: &str, salt: &str) -> Result<Self, SecretsError> {
        let key_bytes =
            hex::decode(encryption_key_hex).map_err(|_| SecretsError::InvalidKeyEncoding)?;
        if key_bytes.len() != KEY_SIZE {
            return Err(SecretsError::InvalidKeyLength(key_bytes.len()));
        }

        let unbound =
            UnboundKey::new(&AES_256_GCM, &key_bytes).map_err(|_| SecretsError::EncryptFailed)?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
            salt: salt.as_bytes().to_vec(),
        })
    }

    /// Encrypt `plaintext`, returning `(ciphertext_with_tag, nonce)`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), SecretsError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| SecretsError::RngFailed)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| SecretsError::EncryptFailed)?;

        Ok((in_out, nonce_bytes.to_vec()))
    }

    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, SecretsError> {
        let nonce_arr: [u8; NONCE_SIZE] =
            nonce.try_into().map_err(|_| SecretsError::DecryptFailed)?;
        let nonce = Nonce::assume_unique_for_key(nonce_arr);

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| SecretsError::DecryptFailed)?;

        Ok(plaintext.to_vec())
    }

    /// 64 random bytes, base64-encoded and truncated to 64 characters.
    /// Used for OAuth2 state entropy.
    pub fn random_string64(&self) -> Result<String, SecretsError> {
        let mut buf = [0u8; 64];
        self.rng.fill(&mut buf).map_err(|_| SecretsError::RngFailed)?;
        Ok(BASE64.encode(buf)[..64].to_string())
    }

    /// Hash for token-at-rest storage: sha256(payload ‖ salt) then bcrypt.
    pub fn hash_token(&self, payload: &[u8]) -> Result<String, SecretsError> {
        bcrypt::hash(self.digest(payload), BCRYPT_MIN_COST)
            .map_err(|e| SecretsError::HashFailed(e.to_string()))
    }

    pub fn verify_token(&self, payload: &[u8], hash: &str) -> bool {
        bcrypt::verify(self.digest(payload), hash).unwrap_or(false)
    }

    fn digest(&self, payload: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        hasher.update(&self.salt);
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn secrets() -> Secrets {
        Secrets::new(KEY_HEX, "pepper").unwrap()
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let s = secrets();
        let (ct, nonce) = s.encrypt(b"my-secret-token").unwrap();
        assert_ne!(ct.as_slice(), b"my-secret-token".as_slice());
        assert_eq!(nonce.len(), NONCE_SIZE);
        assert_eq!(s.decrypt(&ct, &nonce).unwrap(), b"my-secret-token");
    }

    #[test]
    fn fresh_nonce_per_call() {
        let s = secrets();
        let (ct1, n1) = s.encrypt(b"same").unwrap();
        let (ct2, n2) = s.encrypt(b"same").unwrap();
        assert_ne!(n1, n2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn decrypt_rejects_tampered_data() {
        let s = secrets();
        let (mut ct, nonce) = s.encrypt(b"payload").unwrap();
        ct[0] ^= 0xff;
        assert!(matches!(s.decrypt(&ct, &nonce), Err(SecretsError::DecryptFailed)));
    }

    #[test]
    fn decrypt_rejects_wrong_nonce() {
        let s = secrets();
        let (ct, _) = s.encrypt(b"payload").unwrap();
        assert!(s.decrypt(&ct, &[0u8; NONCE_SIZE]).is_err());
    }

    #[test]
    fn key_must_be_32_bytes() {
        assert!(matches!(
            Secrets::new("deadbeef", "salt"),
            Err(SecretsError::InvalidKeyLength(4))
        ));
        assert!(matches!(
            Secrets::new("not-hex!", "salt"),
            Err(SecretsError::InvalidKeyEncoding)
        ));
    }

    #[test]
    fn random_string_is_64_chars() {
        let s = secrets();
        let a = s.random_string64().unwrap();
        let b = s.random_string64().unwrap();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn token_hash_verifies() {
        let s = secrets();
        let hash = s.hash_token(b"token-value").unwrap();
        assert!(s.verify_token(b"token-value", &hash));
        assert!(!s.verify_token(b"other-token", &hash));
    }

    #[test]
    fn salt_changes_the_hash() {
        let a = Secrets::new(KEY_HEX, "salt-a").unwrap();
        let b = Secrets::new(KEY_HEX, "salt-b").unwrap();
        let hash = a.hash_token(b"tok").unwrap();
        assert!(!b.verify_token(b"tok", &hash));
    }
}
