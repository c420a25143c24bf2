//! Passphrase-sealed vault file.
//!
//! Each value is sealed with ChaCha20-Poly1305 under a key derived from the
//! passphrase with Argon2id. The storage key is bound as associated data, so
//! a ciphertext cannot be moved to a different key. The vault is rewritten
//! atomically (temp file + rename) with owner-only permissions on Unix.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{SecureStore, StoreError};

const APP_DIR: &str = "finapp-auth";
const VAULT_FILE: &str = "vault.json";
const VAULT_VERSION: u8 = 1;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Known plaintext sealed at creation, used to detect a wrong passphrase.
const CHECK_PLAINTEXT: &[u8] = b"finapp-auth-vault";
const CHECK_AAD: &[u8] = b"__check__";

#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Argon2id cost parameters, recorded in the vault so it can be reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: Params::DEFAULT_M_COST,
            t_cost: Params::DEFAULT_T_COST,
            p_cost: Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sealed {
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultFile {
    version: u8,
    kdf: KdfParams,
    salt: Vec<u8>,
    check: Sealed,
    #[serde(default)]
    entries: BTreeMap<String, Sealed>,
}

pub struct EncryptedFileStore {
    path: PathBuf,
    cipher: ChaCha20Poly1305,
    vault: RwLock<VaultFile>,
}

impl fmt::Debug for EncryptedFileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedFileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl EncryptedFileStore {
    /// Open the vault at `path`, creating it on first write if it does not exist.
    ///
    /// Fails with [`StoreError::Crypto`] if the passphrase does not match an
    /// existing vault.
    pub async fn open(path: impl AsRef<Path>, passphrase: &str) -> Result<Self, StoreError> {
        Self::open_with_params(path, passphrase, KdfParams::default()).await
    }

    /// Like [`open`](Self::open), with explicit KDF costs for a new vault.
    /// An existing vault keeps the parameters it was created with.
    pub async fn open_with_params(
        path: impl AsRef<Path>,
        passphrase: &str,
        params: KdfParams,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read_to_string(&path).await?;
            let vault: VaultFile = serde_json::from_str(&contents)
                .map_err(|e| StoreError::Corrupt(format!("Failed to parse vault file: {}", e)))?;
            if vault.version != VAULT_VERSION {
                return Err(StoreError::Corrupt(format!(
                    "Unsupported vault version {}",
                    vault.version
                )));
            }

            let cipher = derive_cipher(passphrase, vault.salt.clone(), vault.kdf).await?;
            let check = open_sealed(&cipher, &vault.check, CHECK_AAD)
                .map_err(|_| StoreError::Crypto("Wrong passphrase or damaged vault".to_string()))?;
            if check != CHECK_PLAINTEXT {
                return Err(StoreError::Crypto("Wrong passphrase or damaged vault".to_string()));
            }

            debug!(path = %path.display(), entries = vault.entries.len(), "Opened vault");
            return Ok(Self {
                path,
                cipher,
                vault: RwLock::new(vault),
            });
        }

        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let cipher = derive_cipher(passphrase, salt.clone(), params).await?;
        let check = seal(&cipher, CHECK_PLAINTEXT, CHECK_AAD)?;

        debug!(path = %path.display(), "Initialized new vault");
        Ok(Self {
            path,
            cipher,
            vault: RwLock::new(VaultFile {
                version: VAULT_VERSION,
                kdf: params,
                salt,
                check,
                entries: BTreeMap::new(),
            }),
        })
    }

    /// Default vault location: `<data_dir>/finapp-auth/vault.json`.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not find data directory",
            ))
        })?;
        Ok(data_dir.join(APP_DIR).join(VAULT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self, vault))]
    async fn persist(&self, vault: &VaultFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(vault)
            .map_err(|e| StoreError::Corrupt(format!("Failed to serialize vault: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(FILE_MODE)).await?;
        }

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SecureStore for EncryptedFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let vault = self.vault.read().await;
        let Some(sealed) = vault.entries.get(key) else {
            return Ok(None);
        };
        let plaintext = open_sealed(&self.cipher, sealed, key.as_bytes())?;
        let value = String::from_utf8(plaintext)
            .map_err(|_| StoreError::Corrupt(format!("Entry '{}' is not valid UTF-8", key)))?;
        Ok(Some(value))
    }

    #[instrument(skip(self, value), fields(path = %self.path.display()))]
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let sealed = seal(&self.cipher, value.as_bytes(), key.as_bytes())?;
        let mut vault = self.vault.write().await;
        // Memory only changes once the file write has gone through
        let mut next = vault.clone();
        next.entries.insert(key.to_string(), sealed);
        self.persist(&next).await?;
        *vault = next;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut vault = self.vault.write().await;
        if !vault.entries.contains_key(key) {
            return Ok(());
        }
        let mut next = vault.clone();
        next.entries.remove(key);
        self.persist(&next).await?;
        *vault = next;
        Ok(())
    }

    fn name(&self) -> &str {
        "encrypted-file"
    }
}

async fn derive_cipher(
    passphrase: &str,
    salt: Vec<u8>,
    kdf: KdfParams,
) -> Result<ChaCha20Poly1305, StoreError> {
    let passphrase = passphrase.as_bytes().to_vec();
    let key = tokio::task::spawn_blocking(move || -> Result<[u8; KEY_LEN], StoreError> {
        let params = Params::new(kdf.m_cost, kdf.t_cost, kdf.p_cost, Some(KEY_LEN))
            .map_err(|e| StoreError::Crypto(format!("Invalid KDF parameters: {}", e)))?;
        let mut key = [0u8; KEY_LEN];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(&passphrase, &salt, &mut key)
            .map_err(|e| StoreError::Crypto(format!("Key derivation failed: {}", e)))?;
        Ok(key)
    })
    .await
    .map_err(|e| StoreError::Crypto(format!("Key derivation task failed: {}", e)))??;

    Ok(ChaCha20Poly1305::new(Key::from_slice(&key)))
}

fn seal(cipher: &ChaCha20Poly1305, msg: &[u8], aad: &[u8]) -> Result<Sealed, StoreError> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), Payload { msg, aad })
        .map_err(|_| StoreError::Crypto("Encryption failed".to_string()))?;
    Ok(Sealed {
        nonce: nonce.to_vec(),
        ciphertext,
    })
}

fn open_sealed(cipher: &ChaCha20Poly1305, sealed: &Sealed, aad: &[u8]) -> Result<Vec<u8>, StoreError> {
    if sealed.nonce.len() != NONCE_LEN {
        return Err(StoreError::Corrupt("Invalid nonce length".to_string()));
    }
    cipher
        .decrypt(
            Nonce::from_slice(&sealed.nonce),
            Payload {
                msg: &sealed.ciphertext,
                aad,
            },
        )
        .map_err(|_| StoreError::Crypto("Decryption failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Cheap parameters so tests do not spend seconds in the KDF
    const TEST_KDF: KdfParams = KdfParams {
        m_cost: 256,
        t_cost: 1,
        p_cost: 1,
    };

    async fn open(path: &Path, passphrase: &str) -> Result<EncryptedFileStore, StoreError> {
        EncryptedFileStore::open_with_params(path, passphrase, TEST_KDF).await
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");

        let store = open(&path, "hunter2").await.unwrap();
        store.set("auth_token", "AT1").await.unwrap();
        store.set("refresh_token", "RT1").await.unwrap();
        drop(store);

        let store = open(&path, "hunter2").await.unwrap();
        assert_eq!(store.get("auth_token").await.unwrap().as_deref(), Some("AT1"));
        assert_eq!(store.get("refresh_token").await.unwrap().as_deref(), Some("RT1"));
    }

    #[tokio::test]
    async fn test_wrong_passphrase_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");

        let store = open(&path, "correct").await.unwrap();
        store.set("auth_token", "AT1").await.unwrap();
        drop(store);

        let err = open(&path, "wrong").await.unwrap_err();
        assert!(matches!(err, StoreError::Crypto(_)));
    }

    #[tokio::test]
    async fn test_file_does_not_contain_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");

        let store = open(&path, "pass").await.unwrap();
        store.set("auth_token", "super-secret-token").await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("super-secret-token"));
        assert!(contents.contains("auth_token"));
    }

    #[tokio::test]
    async fn test_missing_vault_is_not_created_until_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vault.json");

        let store = open(&path, "pass").await.unwrap();
        assert!(store.get("auth_token").await.unwrap().is_none());
        store.delete("auth_token").await.unwrap();
        assert!(!path.exists());

        store.set("auth_token", "AT").await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");

        let store = open(&path, "pass").await.unwrap();
        store.set("auth_token", "AT").await.unwrap();
        store.delete("auth_token").await.unwrap();
        assert!(store.get("auth_token").await.unwrap().is_none());

        let store = open(&path, "pass").await.unwrap();
        assert!(store.get("auth_token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_set_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        let path = sub.join("vault.json");

        let store = open(&path, "pass").await.unwrap();
        // A regular file where the vault directory should be
        std::fs::write(&sub, "x").unwrap();

        assert!(store.set("auth_token", "AT").await.is_err());
        assert!(store.get("auth_token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");

        let store = open(&path, "pass").await.unwrap();
        store.set("auth_token", "AT").await.unwrap();
        // The temp file cannot be written over a directory
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();

        assert!(store.delete("auth_token").await.is_err());
        assert_eq!(store.get("auth_token").await.unwrap().as_deref(), Some("AT"));

        let reopened = open(&path, "pass").await.unwrap();
        assert_eq!(reopened.get("auth_token").await.unwrap().as_deref(), Some("AT"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_vault_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");
        let store = open(&path, "pass").await.unwrap();
        store.set("auth_token", "AT").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, FILE_MODE);
    }

    #[tokio::test]
    async fn test_swapped_ciphertext_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");

        let store = open(&path, "pass").await.unwrap();
        store.set("auth_token", "AT").await.unwrap();
        {
            let mut vault = store.vault.write().await;
            let sealed = vault.entries.get("auth_token").cloned().unwrap();
            vault.entries.insert("refresh_token".to_string(), sealed);
        }
        assert!(store.get("refresh_token").await.is_err());
    }
}
