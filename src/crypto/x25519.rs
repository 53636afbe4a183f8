//! Curve 25519 via x25519-dalek.

use rand_core::OsRng;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as DalekPublicKey, StaticSecret as DalekStaticSecret};

use super::dh::{Curve, PrivateKey, PublicKey};
use crate::error::Error;

/// DHLEN for curve 25519.
pub const DHLEN: usize = 32;

pub(crate) fn new_curve() -> Box<dyn Curve> {
    Box::new(Curve25519)
}

struct Curve25519;

impl Curve for Curve25519 {
    fn name(&self) -> &'static str {
        "25519"
    }

    fn dhlen(&self) -> usize {
        DHLEN
    }

    fn generate_keypair(&self) -> Result<Box<dyn PrivateKey>, Error> {
        Ok(Box::new(PrivateKey25519::from_secret(
            DalekStaticSecret::random_from_rng(OsRng),
        )))
    }

    fn load_private(&self, data: &[u8]) -> Result<Box<dyn PrivateKey>, Error> {
        let bytes: [u8; DHLEN] = data.try_into().map_err(|_| Error::BadKey)?;
        Ok(Box::new(PrivateKey25519::from_secret(
            DalekStaticSecret::from(bytes),
        )))
    }

    fn load_public(&self, data: &[u8]) -> Result<Box<dyn PublicKey>, Error> {
        let bytes: [u8; DHLEN] = data.try_into().map_err(|_| Error::BadKey)?;
        Ok(Box::new(PublicKey25519(bytes)))
    }
}

struct PublicKey25519([u8; DHLEN]);

impl PublicKey for PublicKey25519 {
    fn bytes(&self) -> &[u8] {
        &self.0
    }
}

struct PrivateKey25519 {
    secret: DalekStaticSecret,
    public: PublicKey25519,
}

impl PrivateKey25519 {
    fn from_secret(secret: DalekStaticSecret) -> Self {
        let public = PublicKey25519(DalekPublicKey::from(&secret).to_bytes());
        Self { secret, public }
    }
}

impl PrivateKey for PrivateKey25519 {
    fn bytes(&self) -> Vec<u8> {
        self.secret.to_bytes().to_vec()
    }

    fn public(&self) -> &dyn PublicKey {
        &self.public
    }

    fn dh(&self, public: &[u8]) -> Result<Vec<u8>, Error> {
        let bytes: [u8; DHLEN] = public.try_into().map_err(|_| Error::BadKey)?;
        let shared = self.secret.diffie_hellman(&DalekPublicKey::from(bytes));

        // An all-zero output means the remote key was a low-order
        // point, per RFC 7748 section 6.1.
        if bool::from(shared.as_bytes().ct_eq(&[0u8; DHLEN])) {
            return Err(Error::BadKey);
        }
        Ok(shared.as_bytes().to_vec())
    }
}
