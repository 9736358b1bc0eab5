//! Encryption-at-rest for cache values: a serialize → encrypt → store
//! boundary (spec.md §4.5, §9 redesign note). AES-256-CBC with a
//! process-random 32-byte key and 16-byte IV generated once at startup,
//! grounded in the RustCrypto stack used by `harborgrid-justin-rusty-db`'s
//! `security_vault::tde` (same family of crates, CBC instead of GCM since
//! the spec calls for CBC specifically and this is informational-only, not
//! cross-process confidentiality — spec.md §4.5).
//!
//! Kept behind a [`Cipher`] trait so tests can swap in [`NoopCipher`]
//! instead of paying for real encryption.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::error::FrameworkError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Serialize → encrypt → store boundary for cache values.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, FrameworkError>;
}

/// AES-256-CBC with a process-random key/IV pair, generated once at
/// [`Aes256CbcCipher::new`] and held for the process lifetime.
pub struct Aes256CbcCipher {
    key: [u8; 32],
    iv: [u8; 16],
}

impl Aes256CbcCipher {
    pub fn new() -> Self {
        let mut key = [0u8; 32];
        let mut iv = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut key);
        rand::thread_rng().fill_bytes(&mut iv);
        Aes256CbcCipher { key, iv }
    }
}

impl Default for Aes256CbcCipher {
    fn default() -> Self {
        Self::new()
    }
}

impl Cipher for Aes256CbcCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes256CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, FrameworkError> {
        Aes256CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| FrameworkError::internal("cache value failed to decrypt"))
    }
}

/// Identity cipher used in tests so cache behavior can be asserted without
/// decrypting real ciphertext.
#[derive(Default)]
pub struct NoopCipher;

impl Cipher for NoopCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        plaintext.to_vec()
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, FrameworkError> {
        Ok(ciphertext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_round_trips_arbitrary_bytes() {
        let cipher = Aes256CbcCipher::new();
        for input in [&b""[..], b"x", b"hello, tejas!", &[0u8; 1000]] {
            let ciphertext = cipher.encrypt(input);
            let plaintext = cipher.decrypt(&ciphertext).unwrap();
            assert_eq!(plaintext, input);
        }
    }

    #[test]
    fn noop_cipher_is_identity() {
        let cipher = NoopCipher;
        let ciphertext = cipher.encrypt(b"plain");
        assert_eq!(ciphertext, b"plain");
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), b"plain");
    }
}
