// AES-256-GCM cipher for credential payloads
//
// Ciphertext layout: nonce (12 bytes) || sealed payload || tag (16 bytes).

use courier_core::error::{AppError, Result};
use courier_core::port::SecretCipher;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Raw key length in bytes
pub const KEY_LEN: usize = 32;

pub struct AesGcmCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl AesGcmCipher {
    pub fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(AppError::Crypto(format!(
                "key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, bytes)
            .map_err(|_| AppError::Crypto("invalid AES-256-GCM key".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Fresh random key (tests, first start)
    pub fn generate() -> Result<Self> {
        Self::from_key_bytes(&random_key(&SystemRandom::new())?)
    }

    /// Load the key file, creating it with owner-only permissions if absent
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let bytes = fs::read(path)?;
            return Self::from_key_bytes(&bytes);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let key = random_key(&SystemRandom::new())?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(&key)?;
        file.sync_all()?;
        info!(path = %path.display(), "Created credential key file");

        Self::from_key_bytes(&key)
    }
}

fn random_key(rng: &SystemRandom) -> Result<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    rng.fill(&mut key)
        .map_err(|_| AppError::Crypto("system random source failed".to_string()))?;
    Ok(key)
}

impl SecretCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| AppError::Crypto("system random source failed".to_string()))?;

        let mut sealed = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut sealed,
            )
            .map_err(|_| AppError::Crypto("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(AppError::Crypto("ciphertext too short".to_string()));
        }
        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| AppError::Crypto("invalid nonce".to_string()))?;

        let mut buffer = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| AppError::Crypto("decryption failed (wrong key or tampered data)".to_string()))?;
        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_uses_fresh_nonce() {
        let cipher = AesGcmCipher::generate().unwrap();
        let a = cipher.encrypt(b"{\"password\":\"pw\"}").unwrap();
        let b = cipher.encrypt(b"{\"password\":\"pw\"}").unwrap();

        assert_ne!(a, b);
        assert_eq!(cipher.decrypt(&a).unwrap(), b"{\"password\":\"pw\"}");
    }

    #[test]
    fn test_wrong_key_and_tampering_are_rejected() {
        let cipher = AesGcmCipher::generate().unwrap();
        let other = AesGcmCipher::generate().unwrap();
        let mut sealed = cipher.encrypt(b"secret").unwrap();

        assert!(matches!(other.decrypt(&sealed), Err(AppError::Crypto(_))));
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(cipher.decrypt(&sealed).is_err());
        assert!(cipher.decrypt(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_key_file_created_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("secret.key");

        let first = AesGcmCipher::load_or_create(&path).unwrap();
        let sealed = first.encrypt(b"payload").unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), KEY_LEN);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let second = AesGcmCipher::load_or_create(&path).unwrap();
        assert_eq!(second.decrypt(&sealed).unwrap(), b"payload");
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(AesGcmCipher::from_key_bytes(&[1u8; 16]).is_err());
    }
}
