use crate::app_dirs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const KEYRING_SERVICE: &str = "snapclass";
const KEYRING_KEY: &str = "snapclass_session_token";
const DISABLE_KEYRING_ENV: &str = "SNAPCLASS_DISABLE_KEYRING";
const TOKEN_FILE_NAME: &str = "session_token.bin";
const KEY_FILE_NAME: &str = "session_token.key";
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SessionTokenStoreError {
    #[error("Token store unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Crypto error: {0}")]
    Crypto(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("App dir error: {0}")]
    AppDir(#[from] app_dirs::AppDirError),
}

/// Persistence for the single bearer token issued at login.
pub trait TokenStore {
    fn get(&self) -> Result<Option<String>, SessionTokenStoreError>;
    /// Store `token`; blank tokens are ignored.
    fn set(&self, token: &str) -> Result<(), SessionTokenStoreError>;
    fn delete(&self) -> Result<(), SessionTokenStoreError>;
}

/// OS keyring storage with an encrypted-file fallback under `secrets/`.
#[derive(Clone, Debug)]
pub struct SessionTokenStore {
    fallback_dir: PathBuf,
}

impl SessionTokenStore {
    pub fn new() -> Result<Self, SessionTokenStoreError> {
        Ok(Self {
            fallback_dir: app_dirs::secrets_dir()?,
        })
    }

    /// Store whose fallback files live in `dir`.
    pub fn with_fallback_dir(dir: impl Into<PathBuf>) -> Result<Self, SessionTokenStoreError> {
        let fallback_dir = dir.into();
        std::fs::create_dir_all(&fallback_dir)?;
        Ok(Self { fallback_dir })
    }

    fn keyring_entry() -> Result<keyring::Entry, SessionTokenStoreError> {
        keyring::Entry::new(KEYRING_SERVICE, KEYRING_KEY)
            .map_err(|err| SessionTokenStoreError::Unavailable(err.to_string()))
    }

    fn try_keyring_get(&self) -> Result<Option<String>, SessionTokenStoreError> {
        if keyring_disabled() {
            return Ok(None);
        }
        match Self::keyring_entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => {
                tracing::debug!("Keyring read failed, using fallback: {err}");
                Ok(None)
            }
        }
    }

    fn try_keyring_set(&self, token: &str) -> Result<(), SessionTokenStoreError> {
        if keyring_disabled() {
            return Err(SessionTokenStoreError::Unavailable("keyring disabled".into()));
        }
        Self::keyring_entry()?
            .set_password(token)
            .map_err(|err| SessionTokenStoreError::Unavailable(err.to_string()))
    }

    fn try_keyring_delete(&self) -> Result<(), SessionTokenStoreError> {
        if keyring_disabled() {
            return Ok(());
        }
        let _ = Self::keyring_entry()?.delete_credential();
        Ok(())
    }

    fn token_path(&self) -> PathBuf {
        self.fallback_dir.join(TOKEN_FILE_NAME)
    }

    fn key_path(&self) -> PathBuf {
        self.fallback_dir.join(KEY_FILE_NAME)
    }

    fn fallback_get(&self) -> Result<Option<String>, SessionTokenStoreError> {
        let token_path = self.token_path();
        if !token_path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(token_path)?;
        if data.len() < NONCE_LEN {
            return Err(SessionTokenStoreError::Decode("token file too short".into()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let key_bytes = std::fs::read(self.key_path())?;
        if key_bytes.len() != KEY_LEN {
            return Err(SessionTokenStoreError::Decode("token key invalid".into()));
        }
        let plaintext = decrypt(&key_bytes, nonce, ciphertext)?;
        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|err| SessionTokenStoreError::Decode(err.to_string()))
    }

    fn fallback_set(&self, token: &str) -> Result<(), SessionTokenStoreError> {
        let key_path = self.key_path();
        let key_bytes = if key_path.exists() {
            std::fs::read(&key_path)?
        } else {
            let bytes = random_bytes(KEY_LEN)?;
            write_private_file(&key_path, &bytes)?;
            bytes
        };
        if key_bytes.len() != KEY_LEN {
            return Err(SessionTokenStoreError::Decode("token key invalid".into()));
        }
        let nonce = random_bytes(NONCE_LEN)?;
        let ciphertext = encrypt(&key_bytes, &nonce, token.as_bytes())?;
        let mut payload = nonce;
        payload.extend_from_slice(&ciphertext);
        write_private_file(&self.token_path(), &payload)
    }

    fn fallback_delete(&self) {
        let _ = std::fs::remove_file(self.token_path());
        let _ = std::fs::remove_file(self.key_path());
    }
}

impl TokenStore for SessionTokenStore {
    fn get(&self) -> Result<Option<String>, SessionTokenStoreError> {
        if let Some(token) = self.try_keyring_get()? {
            return Ok(Some(token));
        }
        self.fallback_get()
    }

    fn set(&self, token: &str) -> Result<(), SessionTokenStoreError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(());
        }
        if self.try_keyring_set(token).is_ok() {
            self.fallback_delete();
            return Ok(());
        }
        self.fallback_set(token)
    }

    fn delete(&self) -> Result<(), SessionTokenStoreError> {
        let _ = self.try_keyring_delete();
        self.fallback_delete();
        Ok(())
    }
}

/// Process-local store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Result<Option<String>, SessionTokenStoreError> {
        Ok(self
            .token
            .lock()
            .map_err(|_| SessionTokenStoreError::Unavailable("token lock poisoned".into()))?
            .clone())
    }

    fn set(&self, token: &str) -> Result<(), SessionTokenStoreError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(());
        }
        *self
            .token
            .lock()
            .map_err(|_| SessionTokenStoreError::Unavailable("token lock poisoned".into()))? =
            Some(token.to_string());
        Ok(())
    }

    fn delete(&self) -> Result<(), SessionTokenStoreError> {
        *self
            .token
            .lock()
            .map_err(|_| SessionTokenStoreError::Unavailable("token lock poisoned".into()))? = None;
        Ok(())
    }
}

fn keyring_disabled() -> bool {
    std::env::var(DISABLE_KEYRING_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn random_bytes(len: usize) -> Result<Vec<u8>, SessionTokenStoreError> {
    use rand::TryRngCore;
    let mut out = vec![0u8; len];
    rand::rngs::OsRng
        .try_fill_bytes(&mut out)
        .map_err(|err| SessionTokenStoreError::Unavailable(err.to_string()))?;
    Ok(out)
}

fn write_private_file(path: &Path, bytes: &[u8]) -> Result<(), SessionTokenStoreError> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    file.write_all(bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

fn cipher(key: &[u8]) -> Result<chacha20poly1305::ChaCha20Poly1305, SessionTokenStoreError> {
    use chacha20poly1305::aead::KeyInit;
    chacha20poly1305::ChaCha20Poly1305::new_from_slice(key)
        .map_err(|err| SessionTokenStoreError::Crypto(err.to_string()))
}

fn encrypt(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, SessionTokenStoreError> {
    use chacha20poly1305::aead::Aead;
    cipher(key)?
        .encrypt(chacha20poly1305::Nonce::from_slice(nonce), plaintext)
        .map_err(|err| SessionTokenStoreError::Crypto(err.to_string()))
}

fn decrypt(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, SessionTokenStoreError> {
    use chacha20poly1305::aead::Aead;
    cipher(key)?
        .decrypt(chacha20poly1305::Nonce::from_slice(nonce), ciphertext)
        .map_err(|err| SessionTokenStoreError::Crypto(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn encrypted_fallback_roundtrip() {
        let dir = tempdir().unwrap();
        let store = SessionTokenStore::with_fallback_dir(dir.path()).unwrap();
        assert_eq!(store.fallback_get().unwrap(), None);
        store.fallback_set("T0ken").unwrap();
        let raw = std::fs::read(dir.path().join(TOKEN_FILE_NAME)).unwrap();
        assert!(!raw.windows(5).any(|window| window == b"T0ken"));
        assert_eq!(store.fallback_get().unwrap().as_deref(), Some("T0ken"));
        store.fallback_delete();
        assert_eq!(store.fallback_get().unwrap(), None);
    }

    #[test]
    fn corrupt_token_file_is_reported() {
        let dir = tempdir().unwrap();
        let store = SessionTokenStore::with_fallback_dir(dir.path()).unwrap();
        std::fs::write(dir.path().join(TOKEN_FILE_NAME), b"short").unwrap();
        assert!(matches!(
            store.fallback_get(),
            Err(SessionTokenStoreError::Decode(_))
        ));
    }

    #[test]
    fn memory_store_ignores_blank_tokens() {
        let store = MemoryTokenStore::default();
        store.set("   ").unwrap();
        assert_eq!(store.get().unwrap(), None);
        store.set(" T ").unwrap();
        assert_eq!(store.get().unwrap().as_deref(), Some("T"));
        store.delete().unwrap();
        assert_eq!(store.get().unwrap(), None);
    }
}
