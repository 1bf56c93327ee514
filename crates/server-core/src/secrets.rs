//! At-rest encryption for host credentials.
//!
//! Host passwords and private keys are stored as `enc:v1:` strings:
//! XChaCha20-Poly1305 with a per-record salt and nonce, the record key derived
//! from a process-wide master secret via Argon2id. The master secret is
//! supplied externally at startup and decrypted material only ever lives
//! transiently inside [`secrecy`] wrappers.

use anyhow::{Result, anyhow};
use argon2::{
    Argon2, password_hash::{PasswordHasher, SaltString}
};
use base64::Engine;
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce, aead::{Aead, KeyInit, OsRng}
};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretBox};

const MASTER_KEY_ENV: &str = "GATEHOUSE_SECRETS_KEY"; // base64 32 bytes
const MASTER_PASSPHRASE_ENV: &str = "GATEHOUSE_SECRETS_PASSPHRASE"; // string

const ENC_PREFIX: &str = "enc:v1:";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;

pub type SecretBoxedString = SecretBox<String>;

/// Process-wide key-derivation secret for at-rest host credentials.
pub struct MasterSecret {
    material: SecretBox<Vec<u8>>,
}

impl MasterSecret {
    /// Resolve the master secret from the environment.
    pub fn from_env() -> Result<Self> {
        if let Ok(key_b64) = std::env::var(MASTER_KEY_ENV) {
            let master = base64::engine::general_purpose::STANDARD
                .decode(key_b64)
                .map_err(|e| anyhow!("{MASTER_KEY_ENV} must be base64-encoded 32 bytes: {e}"))?;
            if master.len() != 32 {
                return Err(anyhow!("{MASTER_KEY_ENV} must be 32 bytes (base64)"));
            }
            return Ok(Self::from_bytes(master));
        }
        if let Ok(pass) = std::env::var(MASTER_PASSPHRASE_ENV) {
            return Ok(Self::from_bytes(pass.into_bytes()));
        }
        Err(anyhow!(
            "missing secrets key: set {MASTER_KEY_ENV} (base64 32 bytes) or {MASTER_PASSPHRASE_ENV}"
        ))
    }

    pub fn from_passphrase(passphrase: &str) -> Self {
        Self::from_bytes(passphrase.as_bytes().to_vec())
    }

    fn from_bytes(material: Vec<u8>) -> Self {
        Self {
            material: SecretBox::new(Box::new(material)),
        }
    }

    /// Encrypt a credential string into `enc:v1:` framing.
    pub fn encrypt_string(&self, plaintext: &str) -> Result<String> {
        let salt = random_bytes(SALT_LEN);
        let nonce = random_bytes(NONCE_LEN);
        let key = kdf_argon2(self.material.expose_secret(), &salt)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        let ct = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| anyhow!("encryption failed: {e}"))?;

        let mut raw = Vec::with_capacity(SALT_LEN + NONCE_LEN + ct.len());
        raw.extend_from_slice(&salt);
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&ct);
        Ok(format!("{ENC_PREFIX}{}", base64::engine::general_purpose::STANDARD.encode(raw)))
    }

    /// Decrypt an `enc:v1:` string; values without the prefix pass through
    /// unchanged so unencrypted development fixtures keep working.
    pub fn decrypt_string_if_encrypted(&self, value: &str) -> Result<SecretBoxedString> {
        let Some(encoded) = value.strip_prefix(ENC_PREFIX) else {
            return Ok(SecretBox::new(Box::new(value.to_string())));
        };

        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| anyhow!("invalid encrypted value encoding: {e}"))?;
        if raw.len() < SALT_LEN + NONCE_LEN {
            return Err(anyhow!("encrypted value too short"));
        }
        let (salt, rest) = raw.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let key = kdf_argon2(self.material.expose_secret(), salt)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        let pt = cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|e| anyhow!("decryption failed: {e}"))?;
        let pt = String::from_utf8(pt).map_err(|_| anyhow!("decrypted value is not valid UTF-8"))?;
        Ok(SecretBox::new(Box::new(pt)))
    }
}

fn kdf_argon2(secret: &[u8], salt: &[u8]) -> Result<[u8; 32]> {
    let salt_string = SaltString::encode_b64(salt).map_err(|e| anyhow!("invalid salt: {e}"))?;
    let hash = Argon2::default()
        .hash_password(secret, &salt_string)
        .map_err(|e| anyhow!("kdf failed: {e}"))?;
    let raw = hash.hash.ok_or_else(|| anyhow!("argon2 produced no hash"))?;
    let bytes = raw.as_bytes();
    if bytes.len() < 32 {
        return Err(anyhow!("argon2 output too short"));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes[..32]);
    Ok(out)
}

fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    OsRng.fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let master = MasterSecret::from_passphrase("correct horse");
        let enc = master.encrypt_string("hunter2").unwrap();
        assert!(enc.starts_with(ENC_PREFIX));
        let dec = master.decrypt_string_if_encrypted(&enc).unwrap();
        assert_eq!(dec.expose_secret(), "hunter2");
    }

    #[test]
    fn wrong_master_fails() {
        let master = MasterSecret::from_passphrase("correct horse");
        let enc = master.encrypt_string("hunter2").unwrap();
        let other = MasterSecret::from_passphrase("battery staple");
        assert!(other.decrypt_string_if_encrypted(&enc).is_err());
    }

    #[test]
    fn plaintext_passes_through() {
        let master = MasterSecret::from_passphrase("x");
        let dec = master.decrypt_string_if_encrypted("not-encrypted").unwrap();
        assert_eq!(dec.expose_secret(), "not-encrypted");
    }
}
