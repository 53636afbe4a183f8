//! AEAD ciphers and their registry.
//!
//! Both built-in ciphers carry a 32-byte key, a 16-byte tag and a
//! 12-byte nonce built from the 64-bit counter: four zero bytes followed
//! by the counter, big-endian for AESGCM and little-endian for
//! ChaChaPoly. The encoding is a wire contract; swapping it breaks
//! interoperability.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;
use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use once_cell::sync::Lazy;

use crate::error::Error;

/// Cipher key length in bytes.
pub const KEY_LEN: usize = 32;
/// AEAD tag length in bytes.
pub const TAG_LEN: usize = 16;
/// Encoded nonce length in bytes.
pub const NONCE_LEN: usize = 12;
/// The reserved nonce value. Never used for encryption; it signals
/// counter exhaustion and drives the built-in rekey derivation.
pub const MAX_NONCE: u64 = u64::MAX;

/// An AEAD instance as consumed by [`CipherState`](crate::CipherState).
///
/// A `Cipher` starts unbound; `init_key` binds it to a key and
/// `reset` drops the binding again.
pub trait Cipher: Send + Sync {
    /// The registry name, e.g. `"ChaChaPoly"`.
    fn name(&self) -> &'static str;

    /// Bind the cipher to a 32-byte key, replacing any previous binding.
    fn init_key(&mut self, key: &[u8; KEY_LEN]);

    /// Encode the 64-bit counter into the cipher's 12-byte nonce.
    fn encode_nonce(&self, nonce: u64) -> [u8; NONCE_LEN];

    /// Seal `plaintext` under the bound key. Rejects the reserved nonce
    /// with [`Error::NonceOverflow`].
    fn encrypt(&self, nonce: u64, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error>;

    /// Open `ciphertext` under the bound key. Rejects the reserved
    /// nonce; authentication failure is [`Error::AuthFailed`].
    fn decrypt(&self, nonce: u64, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error>;

    /// Derive a replacement key: the first 32 bytes of sealing 32 zero
    /// bytes at the reserved nonce with empty associated data. The only
    /// legal use of the reserved nonce.
    fn rekey(&self) -> Result<[u8; KEY_LEN], Error>;

    /// Ciphertext expansion per message.
    fn overhead(&self) -> usize {
        TAG_LEN
    }

    /// Drop the key binding.
    fn reset(&mut self);

    /// A fresh, unbound instance of the same algorithm.
    fn fresh(&self) -> Box<dyn Cipher>;
}

impl std::fmt::Debug for dyn Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Cipher").field(&self.name()).finish()
    }
}

/// Factory signature stored in the registry.
pub type CipherFactory = fn() -> Box<dyn Cipher>;

fn new_aesgcm() -> Box<dyn Cipher> {
    Box::new(AesGcmCipher::default())
}

fn new_chachapoly() -> Box<dyn Cipher> {
    Box::new(ChaChaPolyCipher::default())
}

static REGISTRY: Lazy<RwLock<HashMap<String, CipherFactory>>> = Lazy::new(|| {
    let mut m: HashMap<String, CipherFactory> = HashMap::new();
    m.insert("AESGCM".to_owned(), new_aesgcm);
    m.insert("ChaChaPoly".to_owned(), new_chachapoly);
    RwLock::new(m)
});

/// Build a fresh cipher instance by registry name.
pub fn from_name(name: &str) -> Result<Box<dyn Cipher>, Error> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry
        .get(name)
        .map(|factory| factory())
        .ok_or_else(|| Error::UnsupportedComponent(name.to_owned()))
}

/// Register a custom cipher. Must happen before any protocol that names
/// it is constructed; replaces an existing entry of the same name.
pub fn register(name: &str, factory: CipherFactory) {
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    registry.insert(name.to_owned(), factory);
}

/// Names of all registered ciphers, unordered.
pub fn supported() -> Vec<String> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry.keys().cloned().collect()
}

/// AES-256-GCM with big-endian nonce encoding.
#[derive(Default)]
struct AesGcmCipher {
    cipher: Option<Aes256Gcm>,
}

impl Cipher for AesGcmCipher {
    fn name(&self) -> &'static str {
        "AESGCM"
    }

    fn init_key(&mut self, key: &[u8; KEY_LEN]) {
        self.cipher = Some(Aes256Gcm::new(key.into()));
    }

    fn encode_nonce(&self, nonce: u64) -> [u8; NONCE_LEN] {
        let mut out = [0u8; NONCE_LEN];
        out[4..].copy_from_slice(&nonce.to_be_bytes());
        out
    }

    fn encrypt(&self, nonce: u64, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        if nonce == MAX_NONCE {
            return Err(Error::NonceOverflow);
        }
        seal(
            self.cipher.as_ref().ok_or(Error::MissingKey("cipher key"))?,
            &self.encode_nonce(nonce),
            ad,
            plaintext,
        )
    }

    fn decrypt(&self, nonce: u64, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        if nonce == MAX_NONCE {
            return Err(Error::NonceOverflow);
        }
        open(
            self.cipher.as_ref().ok_or(Error::MissingKey("cipher key"))?,
            &self.encode_nonce(nonce),
            ad,
            ciphertext,
        )
    }

    fn rekey(&self) -> Result<[u8; KEY_LEN], Error> {
        let cipher = self.cipher.as_ref().ok_or(Error::MissingKey("cipher key"))?;
        derive_rekey(|pt| seal(cipher, &self.encode_nonce(MAX_NONCE), &[], pt))
    }

    fn reset(&mut self) {
        self.cipher = None;
    }

    fn fresh(&self) -> Box<dyn Cipher> {
        new_aesgcm()
    }
}

/// ChaCha20-Poly1305 with little-endian nonce encoding.
#[derive(Default)]
struct ChaChaPolyCipher {
    cipher: Option<ChaCha20Poly1305>,
}

impl Cipher for ChaChaPolyCipher {
    fn name(&self) -> &'static str {
        "ChaChaPoly"
    }

    fn init_key(&mut self, key: &[u8; KEY_LEN]) {
        self.cipher = Some(ChaCha20Poly1305::new(key.into()));
    }

    fn encode_nonce(&self, nonce: u64) -> [u8; NONCE_LEN] {
        let mut out = [0u8; NONCE_LEN];
        out[4..].copy_from_slice(&nonce.to_le_bytes());
        out
    }

    fn encrypt(&self, nonce: u64, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        if nonce == MAX_NONCE {
            return Err(Error::NonceOverflow);
        }
        seal(
            self.cipher.as_ref().ok_or(Error::MissingKey("cipher key"))?,
            &self.encode_nonce(nonce),
            ad,
            plaintext,
        )
    }

    fn decrypt(&self, nonce: u64, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        if nonce == MAX_NONCE {
            return Err(Error::NonceOverflow);
        }
        open(
            self.cipher.as_ref().ok_or(Error::MissingKey("cipher key"))?,
            &self.encode_nonce(nonce),
            ad,
            ciphertext,
        )
    }

    fn rekey(&self) -> Result<[u8; KEY_LEN], Error> {
        let cipher = self.cipher.as_ref().ok_or(Error::MissingKey("cipher key"))?;
        derive_rekey(|pt| seal(cipher, &self.encode_nonce(MAX_NONCE), &[], pt))
    }

    fn reset(&mut self) {
        self.cipher = None;
    }

    fn fresh(&self) -> Box<dyn Cipher> {
        new_chachapoly()
    }
}

fn seal<A: Aead>(
    cipher: &A,
    nonce: &[u8; NONCE_LEN],
    ad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, Error> {
    cipher
        .encrypt(
            GenericArray::from_slice(nonce),
            Payload { msg: plaintext, aad: ad },
        )
        .map_err(|_| Error::AuthFailed)
}

fn open<A: Aead>(
    cipher: &A,
    nonce: &[u8; NONCE_LEN],
    ad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, Error> {
    if ciphertext.len() < TAG_LEN {
        return Err(Error::InvalidPayload);
    }
    cipher
        .decrypt(
            GenericArray::from_slice(nonce),
            Payload { msg: ciphertext, aad: ad },
        )
        .map_err(|_| Error::AuthFailed)
}

fn derive_rekey(
    seal_at_max: impl FnOnce(&[u8]) -> Result<Vec<u8>, Error>,
) -> Result<[u8; KEY_LEN], Error> {
    let sealed = seal_at_max(&[0u8; KEY_LEN])?;
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&sealed[..KEY_LEN]);
    Ok(key)
}
