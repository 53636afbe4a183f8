//! Diffie-Hellman curves and their registry.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::error::Error;

/// A DH public key.
pub trait PublicKey: Send + Sync {
    /// The wire encoding of the key (`DHLEN` bytes).
    fn bytes(&self) -> &[u8];

    /// Hex string of the wire encoding.
    fn hex(&self) -> String {
        hex::encode(self.bytes())
    }
}

/// A DH private key, paired with its public key.
pub trait PrivateKey: Send + Sync {
    /// The raw private key material.
    fn bytes(&self) -> Vec<u8>;

    /// The corresponding public key.
    fn public(&self) -> &dyn PublicKey;

    /// Diffie-Hellman between this key and an encoded remote public
    /// key. Output length is curve-defined and not necessarily the
    /// public-key length.
    fn dh(&self, public: &[u8]) -> Result<Vec<u8>, Error>;
}

/// A DH curve: key generation, key loading, and the wire size.
pub trait Curve: Send + Sync {
    /// The registry name, e.g. `"25519"`.
    fn name(&self) -> &'static str;

    /// Public-key length on the wire (the DHLEN of the noise spec).
    fn dhlen(&self) -> usize;

    /// Generate a fresh keypair from the system RNG.
    fn generate_keypair(&self) -> Result<Box<dyn PrivateKey>, Error>;

    /// Load a private key from raw bytes.
    fn load_private(&self, data: &[u8]) -> Result<Box<dyn PrivateKey>, Error>;

    /// Load a public key from its wire encoding.
    fn load_public(&self, data: &[u8]) -> Result<Box<dyn PublicKey>, Error>;
}

impl std::fmt::Debug for dyn Curve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Curve").field(&self.name()).finish()
    }
}

/// Factory signature stored in the registry.
pub type CurveFactory = fn() -> Box<dyn Curve>;

static REGISTRY: Lazy<RwLock<HashMap<String, CurveFactory>>> = Lazy::new(|| {
    let mut m: HashMap<String, CurveFactory> = HashMap::new();
    m.insert("25519".to_owned(), super::x25519::new_curve);
    m.insert("448".to_owned(), super::x448::new_curve);
    m.insert("secp256k1".to_owned(), super::secp256k1::new_curve);
    RwLock::new(m)
});

/// Build a curve handle by registry name.
pub fn from_name(name: &str) -> Result<Box<dyn Curve>, Error> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry
        .get(name)
        .map(|factory| factory())
        .ok_or_else(|| Error::UnsupportedComponent(name.to_owned()))
}

/// Register a custom curve. Must happen before any protocol that names
/// it is constructed; replaces an existing entry of the same name.
pub fn register(name: &str, factory: CurveFactory) {
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    registry.insert(name.to_owned(), factory);
}

/// Names of all registered curves, unordered.
pub fn supported() -> Vec<String> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry.keys().cloned().collect()
}
