//! Curve 448 via the x448 crate.

use rand_core05::OsRng;
use x448::{PublicKey as X448Public, Secret as X448Secret};

use super::dh::{Curve, PrivateKey, PublicKey};
use crate::error::Error;

/// DHLEN for curve 448.
pub const DHLEN: usize = 56;

pub(crate) fn new_curve() -> Box<dyn Curve> {
    Box::new(Curve448)
}

struct Curve448;

impl Curve for Curve448 {
    fn name(&self) -> &'static str {
        "448"
    }

    fn dhlen(&self) -> usize {
        DHLEN
    }

    fn generate_keypair(&self) -> Result<Box<dyn PrivateKey>, Error> {
        Ok(Box::new(PrivateKey448::from_secret(X448Secret::new(
            &mut OsRng,
        ))))
    }

    fn load_private(&self, data: &[u8]) -> Result<Box<dyn PrivateKey>, Error> {
        // from_bytes clamps the scalar and rejects low-order inputs.
        let secret = X448Secret::from_bytes(data).ok_or(Error::BadKey)?;
        Ok(Box::new(PrivateKey448::from_secret(secret)))
    }

    fn load_public(&self, data: &[u8]) -> Result<Box<dyn PublicKey>, Error> {
        let public = X448Public::from_bytes(data).ok_or(Error::BadKey)?;
        Ok(Box::new(PublicKey448::from_inner(&public)))
    }
}

struct PublicKey448([u8; DHLEN]);

impl PublicKey448 {
    fn from_inner(inner: &X448Public) -> Self {
        Self(*inner.as_bytes())
    }
}

impl PublicKey for PublicKey448 {
    fn bytes(&self) -> &[u8] {
        &self.0
    }
}

struct PrivateKey448 {
    secret: X448Secret,
    public: PublicKey448,
}

impl PrivateKey448 {
    fn from_secret(secret: X448Secret) -> Self {
        let public = PublicKey448::from_inner(&X448Public::from(&secret));
        Self { secret, public }
    }
}

impl PrivateKey for PrivateKey448 {
    fn bytes(&self) -> Vec<u8> {
        self.secret.as_bytes().to_vec()
    }

    fn public(&self) -> &dyn PublicKey {
        &self.public
    }

    fn dh(&self, public: &[u8]) -> Result<Vec<u8>, Error> {
        let remote = X448Public::from_bytes(public).ok_or(Error::BadKey)?;
        // None means the shared point was low order.
        let shared = self
            .secret
            .as_diffie_hellman(&remote)
            .ok_or(Error::BadKey)?;
        Ok(shared.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc7748_x448_shared_secret() {
        // RFC 7748 section 6.2 test keys.
        let alice = hex::decode(
            "9a8f4925d1519f5775cf46b04b5800d4ee9ee8bae8bc5565d498c28d\
             d9c9baf574a9419744897391006382a6f127ab1d9ac2d8c0a598726b",
        )
        .unwrap();
        let bob_public = hex::decode(
            "3eb7a829b0cd20f5bcfc0b599b6feccf6da4627107bdb0d4f345b430\
             27d8b972fc3e34fb4232a13ca706dcb57aec3dae07bdc1c67bf33609",
        )
        .unwrap();
        let expected = hex::decode(
            "07fff4181ac6cc95ec1c16a94a0f74d12da232ce40a77552281d282b\
             b60c0b56fd2464c335543936521c24403085d59a449a5037514a879d",
        )
        .unwrap();

        let curve = Curve448;
        let key = curve.load_private(&alice).unwrap();
        assert_eq!(key.dh(&bob_public).unwrap(), expected);
    }

    #[test]
    fn load_public_rejects_low_order_point() {
        let curve = Curve448;
        // The identity element is a low-order point.
        assert!(curve.load_public(&[0u8; DHLEN]).is_err());
    }
}
