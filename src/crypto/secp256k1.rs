//! secp256k1 via the k256 crate.
//!
//! Public keys travel in 33-byte compressed SEC1 form. The DH output is
//! not the raw x coordinate: it is the SHA-256 of the compressed shared
//! point, giving a 32-byte secret.

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{ProjectivePoint, PublicKey as K256PublicKey, SecretKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};

use super::dh::{Curve, PrivateKey, PublicKey};
use crate::error::Error;

/// Compressed public-key length on the wire.
pub const DHLEN: usize = 33;
/// Private-key length.
pub const PRIVATE_LEN: usize = 32;

pub(crate) fn new_curve() -> Box<dyn Curve> {
    Box::new(CurveSecp256k1)
}

struct CurveSecp256k1;

impl Curve for CurveSecp256k1 {
    fn name(&self) -> &'static str {
        "secp256k1"
    }

    fn dhlen(&self) -> usize {
        DHLEN
    }

    fn generate_keypair(&self) -> Result<Box<dyn PrivateKey>, Error> {
        Ok(Box::new(PrivateKeySecp256k1::from_secret(SecretKey::random(
            &mut OsRng,
        ))))
    }

    fn load_private(&self, data: &[u8]) -> Result<Box<dyn PrivateKey>, Error> {
        if data.len() != PRIVATE_LEN {
            return Err(Error::BadKey);
        }
        let secret = SecretKey::from_slice(data).map_err(|_| Error::BadKey)?;
        Ok(Box::new(PrivateKeySecp256k1::from_secret(secret)))
    }

    fn load_public(&self, data: &[u8]) -> Result<Box<dyn PublicKey>, Error> {
        if data.len() != DHLEN {
            return Err(Error::BadKey);
        }
        let public = K256PublicKey::from_sec1_bytes(data).map_err(|_| Error::BadKey)?;
        Ok(Box::new(PublicKeySecp256k1::from_inner(&public)))
    }
}

struct PublicKeySecp256k1([u8; DHLEN]);

impl PublicKeySecp256k1 {
    fn from_inner(inner: &K256PublicKey) -> Self {
        let encoded = inner.to_encoded_point(true);
        let mut bytes = [0u8; DHLEN];
        bytes.copy_from_slice(encoded.as_bytes());
        Self(bytes)
    }
}

impl PublicKey for PublicKeySecp256k1 {
    fn bytes(&self) -> &[u8] {
        &self.0
    }
}

struct PrivateKeySecp256k1 {
    secret: SecretKey,
    public: PublicKeySecp256k1,
}

impl PrivateKeySecp256k1 {
    fn from_secret(secret: SecretKey) -> Self {
        let public = PublicKeySecp256k1::from_inner(&secret.public_key());
        Self { secret, public }
    }
}

impl PrivateKey for PrivateKeySecp256k1 {
    fn bytes(&self) -> Vec<u8> {
        self.secret.to_bytes().to_vec()
    }

    fn public(&self) -> &dyn PublicKey {
        &self.public
    }

    fn dh(&self, public: &[u8]) -> Result<Vec<u8>, Error> {
        let remote = K256PublicKey::from_sec1_bytes(public).map_err(|_| Error::BadKey)?;
        let scalar = self.secret.to_nonzero_scalar();
        let shared = (ProjectivePoint::from(*remote.as_affine()) * scalar.as_ref()).to_affine();
        let compressed = shared.to_encoded_point(true);
        Ok(Sha256::digest(compressed.as_bytes()).to_vec())
    }
}
