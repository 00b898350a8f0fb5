//! Encrypted at-rest storage for the remembered credential record.
//!
//! One file per key under the app data directory. Each file is
//! `SDV1 | salt(16) | nonce(24) | ciphertext`: the per-file key is
//! derived with Argon2id from a master secret that lives in the OS
//! keychain and never leaves the host, so a copied file is useless on
//! another machine. A file that fails to decrypt is treated as absent.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use keyring::Entry;
use rand::RngCore;
use tracing::{debug, warn};

const MAGIC: &[u8; 4] = b"SDV1";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + SALT_LEN + NONCE_LEN;

const KEYRING_SERVICE: &str = "shopdesk";
const KEYRING_USER: &str = "vault-master";

/// Source of the vault master secret. Production uses the OS keychain;
/// tests inject a fixed secret.
pub trait MasterSecret: Send + Sync {
    fn master_secret(&self) -> Result<Vec<u8>>;
}

/// OS-keychain-backed master secret, generated on first use.
pub struct KeychainSecret;

impl MasterSecret for KeychainSecret {
    fn master_secret(&self) -> Result<Vec<u8>> {
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)
            .context("Failed to create keyring entry")?;
        match entry.get_password() {
            Ok(secret) => Ok(secret.into_bytes()),
            Err(keyring::Error::NoEntry) => {
                debug!("No vault master secret yet, generating one");
                let mut raw = [0u8; KEY_LEN];
                rand::thread_rng().fill_bytes(&mut raw);
                let secret: String = raw.iter().map(|b| format!("{:02x}", b)).collect();
                entry
                    .set_password(&secret)
                    .context("Failed to store vault master secret in keychain")?;
                Ok(secret.into_bytes())
            }
            Err(e) => Err(e).context("Failed to read vault master secret from keychain"),
        }
    }
}

pub struct CredentialVault {
    dir: PathBuf,
    secret: Box<dyn MasterSecret>,
}

impl CredentialVault {
    pub fn new(dir: PathBuf) -> Result<Self> {
        Self::with_secret(dir, Box::new(KeychainSecret))
    }

    pub fn with_secret(dir: PathBuf, secret: Box<dyn MasterSecret>) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create vault directory {}", dir.display()))?;
        Ok(Self { dir, secret })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.vault", key))
    }

    fn derive_key(&self, salt: &[u8]) -> Result<[u8; KEY_LEN]> {
        let secret = self.secret.master_secret()?;
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(&secret, salt, &mut key)
            .map_err(|e| anyhow!("Key derivation failed: {}", e))?;
        Ok(key)
    }

    /// Encrypt `plaintext` and write it to the slot, overwriting any
    /// previous value.
    pub fn save(&self, key: &str, plaintext: &str) -> Result<()> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut nonce);

        let file_key = self.derive_key(&salt)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&file_key));
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        let mut contents = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        contents.extend_from_slice(MAGIC);
        contents.extend_from_slice(&salt);
        contents.extend_from_slice(&nonce);
        contents.extend_from_slice(&ciphertext);

        let path = self.entry_path(key);
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write vault entry {}", path.display()))?;
        Ok(())
    }

    /// Load and decrypt a slot. A missing file is `None`; so is a file
    /// that no longer decrypts (corrupted, or copied from another host).
    pub fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&path)
            .with_context(|| format!("Failed to read vault entry {}", path.display()))?;

        match self.decrypt(&raw) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(e) => {
                warn!(key, error = %e, "Failed to decrypt vault entry, treating as absent");
                Ok(None)
            }
        }
    }

    fn decrypt(&self, raw: &[u8]) -> Result<String> {
        if raw.len() < HEADER_LEN || &raw[..MAGIC.len()] != MAGIC {
            return Err(anyhow!("Not a vault file"));
        }
        let salt = &raw[MAGIC.len()..MAGIC.len() + SALT_LEN];
        let nonce = &raw[MAGIC.len() + SALT_LEN..HEADER_LEN];
        let ciphertext = &raw[HEADER_LEN..];

        let file_key = self.derive_key(salt)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&file_key));
        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|e| anyhow!("Decryption failed: {}", e))?;
        String::from_utf8(plaintext).context("Vault entry is not valid UTF-8")
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete vault entry {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Fixed master secret for tests; no keychain involved.
    pub struct StaticSecret(pub &'static [u8]);

    impl MasterSecret for StaticSecret {
        fn master_secret(&self) -> Result<Vec<u8>> {
            Ok(self.0.to_vec())
        }
    }

    pub fn test_vault(dir: &std::path::Path) -> CredentialVault {
        CredentialVault::with_secret(dir.to_path_buf(), Box::new(StaticSecret(b"test-secret")))
            .expect("vault")
    }
}
