//! Hash functions, HMAC, and the Noise HKDF.
//!
//! HMAC is the standard RFC 2104 construction built directly on the
//! digest, not any keyed mode the digest may offer, for compatibility
//! with other Noise implementations. HKDF is extract-then-expand with
//! the chaining key as salt and empty info, producing two or three
//! HASHLEN outputs.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{PoisonError, RwLock};

use blake2::{Blake2b512, Blake2s256};
use digest::Digest;
use once_cell::sync::Lazy;
use sha2::{Sha256, Sha512};
use zeroize::Zeroizing;

use crate::error::Error;

/// A hash family as consumed by the symmetric state.
///
/// Implementations are stateless; every call hashes from scratch.
pub trait Hash: Send + Sync {
    /// The registry name, e.g. `"SHA256"`.
    fn name(&self) -> &'static str;

    /// The internal block size in bytes, needed for HMAC.
    fn block_len(&self) -> usize;

    /// The output size in bytes. Must be 32 or 64.
    fn hash_len(&self) -> usize;

    /// Hash the concatenation of `parts`.
    fn hash_parts(&self, parts: &[&[u8]]) -> Vec<u8>;

    /// HMAC over the concatenation of `parts` under `key`.
    ///
    /// `key` must not exceed the block length; every key this crate
    /// feeds in is at most HASHLEN bytes.
    fn hmac(&self, key: &[u8], parts: &[&[u8]]) -> Zeroizing<Vec<u8>>;
}

impl std::fmt::Debug for dyn Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Hash").field(&self.name()).finish()
    }
}

/// Factory signature stored in the registry.
pub type HashFactory = fn() -> Box<dyn Hash>;

fn new_sha256() -> Box<dyn Hash> {
    Box::new(DigestHash::<Sha256>::new("SHA256", 64))
}

fn new_sha512() -> Box<dyn Hash> {
    Box::new(DigestHash::<Sha512>::new("SHA512", 128))
}

fn new_blake2s() -> Box<dyn Hash> {
    Box::new(DigestHash::<Blake2s256>::new("BLAKE2s", 64))
}

fn new_blake2b() -> Box<dyn Hash> {
    Box::new(DigestHash::<Blake2b512>::new("BLAKE2b", 128))
}

static REGISTRY: Lazy<RwLock<HashMap<String, HashFactory>>> = Lazy::new(|| {
    let mut m: HashMap<String, HashFactory> = HashMap::new();
    m.insert("SHA256".to_owned(), new_sha256);
    m.insert("SHA512".to_owned(), new_sha512);
    m.insert("BLAKE2s".to_owned(), new_blake2s);
    m.insert("BLAKE2b".to_owned(), new_blake2b);
    RwLock::new(m)
});

/// Build a hash instance by registry name.
pub fn from_name(name: &str) -> Result<Box<dyn Hash>, Error> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry
        .get(name)
        .map(|factory| factory())
        .ok_or_else(|| Error::UnsupportedComponent(name.to_owned()))
}

/// Register a custom hash. Must happen before any protocol that names
/// it is constructed; replaces an existing entry of the same name.
pub fn register(name: &str, factory: HashFactory) {
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    registry.insert(name.to_owned(), factory);
}

/// Names of all registered hashes, unordered.
pub fn supported() -> Vec<String> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry.keys().cloned().collect()
}

/// Adapter from a `digest::Digest` to the [`Hash`] trait.
struct DigestHash<D> {
    name: &'static str,
    block_len: usize,
    _digest: PhantomData<fn() -> D>,
}

impl<D: Digest> DigestHash<D> {
    fn new(name: &'static str, block_len: usize) -> Self {
        Self {
            name,
            block_len,
            _digest: PhantomData,
        }
    }
}

impl<D: Digest> Hash for DigestHash<D> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn block_len(&self) -> usize {
        self.block_len
    }

    fn hash_len(&self) -> usize {
        <D as Digest>::output_size()
    }

    fn hash_parts(&self, parts: &[&[u8]]) -> Vec<u8> {
        let mut hasher = D::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().to_vec()
    }

    fn hmac(&self, key: &[u8], parts: &[&[u8]]) -> Zeroizing<Vec<u8>> {
        const IPAD: u8 = 0x36;
        const OPAD: u8 = 0x5c;

        // Keys are at most HASHLEN (<= block), so no pre-hashing step.
        debug_assert!(key.len() <= self.block_len);

        let mut ipad_key = Zeroizing::new(vec![IPAD; self.block_len]);
        let mut opad_key = Zeroizing::new(vec![OPAD; self.block_len]);
        for (i, byte) in key.iter().enumerate() {
            ipad_key[i] ^= byte;
            opad_key[i] ^= byte;
        }

        let mut inner = D::new();
        inner.update(ipad_key.as_slice());
        for part in parts {
            inner.update(part);
        }
        let inner_hash = inner.finalize();

        let mut outer = D::new();
        outer.update(opad_key.as_slice());
        outer.update(&inner_hash);
        Zeroizing::new(outer.finalize().to_vec())
    }
}

/// HKDF per the Noise spec: `temp = HMAC(ck, ikm)`, then
/// `out1 = HMAC(temp, 0x01)`, `out2 = HMAC(temp, out1 || 0x02)`, and so
/// on for `num` outputs of HASHLEN bytes each.
///
/// Input sizes are the caller's contract; the symmetric state validates
/// them before calling in.
pub(crate) fn hkdf(
    hash: &dyn Hash,
    chaining_key: &[u8],
    ikm: &[u8],
    num: usize,
) -> Result<Vec<Zeroizing<Vec<u8>>>, Error> {
    if num != 2 && num != 3 {
        return Err(Error::InvalidHkdfNum);
    }

    let temp_key = hash.hmac(chaining_key, &[ikm]);
    let mut outputs: Vec<Zeroizing<Vec<u8>>> = Vec::with_capacity(num);
    for i in 1..=num as u8 {
        let output = match outputs.last() {
            None => hash.hmac(&temp_key, &[&[i]]),
            Some(prev) => hash.hmac(&temp_key, &[prev.as_slice(), &[i]]),
        };
        outputs.push(output);
    }
    Ok(outputs)
}
