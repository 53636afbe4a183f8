use std::sync::Arc;

use zeroize::{Zeroize, Zeroizing};

use crate::cipher_state::CipherState;
use crate::crypto::cipher::KEY_LEN;
use crate::crypto::dh::Curve;
use crate::crypto::hash::{self, Hash};
use crate::error::Error;

/// The symmetric-crypto core of a handshake: a [`CipherState`] plus the
/// chaining key `ck` and transcript hash `h`, both HASHLEN bytes.
///
/// One per handshake; deleted once `split()` has produced the transport
/// cipher states.
pub(crate) struct SymmetricState {
    cs: CipherState,
    hash: Box<dyn Hash>,
    curve: Arc<dyn Curve>,
    ck: Zeroizing<Vec<u8>>,
    h: Vec<u8>,
}

impl SymmetricState {
    /// InitializeSymmetric: `h` is the protocol name zero-padded to
    /// HASHLEN, or its hash when longer; `ck = h`; the cipher state
    /// starts in no-key mode.
    pub(crate) fn new(
        cs: CipherState,
        hash: Box<dyn Hash>,
        curve: Arc<dyn Curve>,
        protocol_name: &[u8],
    ) -> Self {
        let hash_len = hash.hash_len();
        let h = if protocol_name.len() <= hash_len {
            let mut h = vec![0u8; hash_len];
            h[..protocol_name.len()].copy_from_slice(protocol_name);
            h
        } else {
            hash.hash_parts(&[protocol_name])
        };

        let mut state = Self {
            cs,
            hash,
            curve,
            ck: Zeroizing::new(h.clone()),
            h,
        };
        state.cs.initialize_key([0u8; KEY_LEN]);
        state
    }

    /// `h = HASH(h || data)`.
    pub(crate) fn mix_hash(&mut self, data: &[u8]) {
        self.h = self.hash.hash_parts(&[&self.h, data]);
    }

    /// `(ck, temp_k) = HKDF(ck, ikm, 2)`, then install `temp_k`
    /// truncated to 32 bytes.
    pub(crate) fn mix_key(&mut self, ikm: &[u8]) -> Result<(), Error> {
        let outputs = self.hkdf(ikm, 2)?;
        self.ck = outputs[0].clone();
        self.cs.initialize_key(cipher_key(&outputs[1]));
        Ok(())
    }

    /// `(ck, temp_h, temp_k) = HKDF(ck, ikm, 3)`, mix `temp_h` into the
    /// transcript, install `temp_k`. Used for `psk` tokens.
    pub(crate) fn mix_key_and_hash(&mut self, ikm: &[u8]) -> Result<(), Error> {
        let outputs = self.hkdf(ikm, 3)?;
        self.ck = outputs[0].clone();
        self.mix_hash(&outputs[1]);
        self.cs.initialize_key(cipher_key(&outputs[2]));
        Ok(())
    }

    /// `EncryptWithAd(h, plaintext)` followed by `MixHash(ciphertext)`.
    pub(crate) fn encrypt_and_hash(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let ciphertext = self.cs.encrypt_with_ad(&self.h, plaintext)?;
        self.mix_hash(&ciphertext);
        Ok(ciphertext)
    }

    /// `DecryptWithAd(h, ciphertext)` followed by `MixHash(ciphertext)`.
    /// The ciphertext is mixed whether or not a key was present.
    pub(crate) fn decrypt_and_hash(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        let plaintext = self.cs.decrypt_with_ad(&self.h, ciphertext)?;
        self.mix_hash(ciphertext);
        Ok(plaintext)
    }

    /// Terminal split: two freshly constructed cipher states keyed from
    /// `HKDF(ck, "", 2)`, each with its own AEAD instance and the
    /// shared rekey policy.
    pub(crate) fn split(&mut self) -> Result<(CipherState, CipherState), Error> {
        let outputs = self.hkdf(&[], 2)?;

        let mut c1 = CipherState::new(self.cs.fresh_cipher(), self.cs.rekeyer_handle());
        c1.initialize_key(cipher_key(&outputs[0]));
        let mut c2 = CipherState::new(self.cs.fresh_cipher(), self.cs.rekeyer_handle());
        c2.initialize_key(cipher_key(&outputs[1]));

        // The handshake-phase cipher state is done once transport keys
        // exist.
        self.cs.reset();
        Ok((c1, c2))
    }

    /// The transcript hash. Stays readable after `split()` for channel
    /// binding.
    pub(crate) fn handshake_hash(&self) -> &[u8] {
        &self.h
    }

    pub(crate) fn curve(&self) -> &Arc<dyn Curve> {
        &self.curve
    }

    pub(crate) fn has_key(&self) -> bool {
        self.cs.has_key()
    }

    pub(crate) fn overhead(&self) -> usize {
        self.cs.overhead()
    }

    pub(crate) fn reset(&mut self) {
        self.ck.zeroize();
        self.h.zeroize();
        self.cs.reset();
    }

    /// HKDF with the chaining key as salt. Input key material must be
    /// empty, 32 bytes, or DHLEN bytes; `num` must be 2 or 3.
    fn hkdf(&self, ikm: &[u8], num: usize) -> Result<Vec<Zeroizing<Vec<u8>>>, Error> {
        if !ikm.is_empty() && ikm.len() != 32 && ikm.len() != self.curve.dhlen() {
            return Err(Error::InvalidKeySize);
        }
        if self.ck.len() != self.hash.hash_len() {
            return Err(Error::InvalidChainingKey);
        }
        hash::hkdf(self.hash.as_ref(), &self.ck, ikm, num)
    }
}

impl Drop for SymmetricState {
    fn drop(&mut self) {
        self.h.zeroize();
    }
}

fn cipher_key(bytes: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&bytes[..KEY_LEN]);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{cipher, dh};

    fn state_for(name: &str, hash_name: &str) -> SymmetricState {
        let cs = CipherState::new(cipher::from_name("ChaChaPoly").unwrap(), None);
        let curve: Arc<dyn Curve> = Arc::from(dh::from_name("25519").unwrap());
        SymmetricState::new(cs, hash::from_name(hash_name).unwrap(), curve, name.as_bytes())
    }

    #[test]
    fn short_protocol_name_is_zero_padded() {
        let ss = state_for("Noise_NN_25519_ChaChaPoly_BLAKE2s", "BLAKE2s");
        let h = ss.handshake_hash();
        assert_eq!(h.len(), 32);
        assert_eq!(&h[..5], b"Noise");
    }

    #[test]
    fn long_protocol_name_is_hashed() {
        let name = "Noise_XXpsk0+psk1_25519_ChaChaPoly_BLAKE2s";
        assert!(name.len() > 32);
        let ss = state_for(name, "BLAKE2s");
        let expected = hash::from_name("BLAKE2s")
            .unwrap()
            .hash_parts(&[name.as_bytes()]);
        assert_eq!(ss.handshake_hash(), &expected[..]);
    }

    #[test]
    fn mix_hash_is_order_sensitive() {
        let mut a = state_for("test", "SHA256");
        let mut b = state_for("test", "SHA256");
        a.mix_hash(b"one");
        a.mix_hash(b"two");
        b.mix_hash(b"two");
        b.mix_hash(b"one");
        assert_ne!(a.handshake_hash(), b.handshake_hash());
    }

    #[test]
    fn mix_key_installs_a_cipher_key() {
        let mut ss = state_for("test", "SHA256");
        assert!(!ss.has_key());
        ss.mix_key(&[7u8; 32]).unwrap();
        assert!(ss.has_key());
        assert_eq!(ss.overhead(), 16);
    }

    #[test]
    fn mix_key_rejects_bad_ikm_length() {
        let mut ss = state_for("test", "SHA256");
        assert_eq!(ss.mix_key(&[7u8; 31]).unwrap_err(), Error::InvalidKeySize);
    }

    #[test]
    fn encrypt_and_hash_without_key_still_mixes() {
        let mut writer = state_for("test", "BLAKE2s");
        let before = writer.handshake_hash().to_vec();
        let ct = writer.encrypt_and_hash(b"payload").unwrap();
        assert_eq!(ct, b"payload");
        assert_ne!(writer.handshake_hash(), &before[..]);
    }

    #[test]
    fn peers_converge_through_mix_and_split() {
        let mut alice = state_for("test", "SHA512");
        let mut bob = state_for("test", "SHA512");

        for ss in [&mut alice, &mut bob] {
            ss.mix_hash(b"prologue");
            ss.mix_key(&[0x55u8; 32]).unwrap();
            ss.mix_key_and_hash(&[0x66u8; 32]).unwrap();
        }

        let ct = alice.encrypt_and_hash(b"secret").unwrap();
        assert_eq!(bob.decrypt_and_hash(&ct).unwrap(), b"secret");
        assert_eq!(alice.handshake_hash(), bob.handshake_hash());

        let (mut a1, mut a2) = alice.split().unwrap();
        let (mut b1, mut b2) = bob.split().unwrap();
        assert_eq!(a1.key_bytes(), b1.key_bytes());
        assert_eq!(a2.key_bytes(), b2.key_bytes());
        assert_ne!(a1.key_bytes(), a2.key_bytes());

        // Directional transport: a1 speaks to b1, b2 speaks to a2.
        let ct = a1.encrypt_with_ad(b"", b"transport").unwrap();
        assert_eq!(b1.decrypt_with_ad(b"", &ct).unwrap(), b"transport");
        let ct = b2.encrypt_with_ad(b"", b"reply").unwrap();
        assert_eq!(a2.decrypt_with_ad(b"", &ct).unwrap(), b"reply");
    }

    #[test]
    fn tampered_transcript_fails_decrypt() {
        let mut alice = state_for("test", "SHA256");
        let mut bob = state_for("test", "SHA256");
        alice.mix_key(&[1u8; 32]).unwrap();
        bob.mix_key(&[1u8; 32]).unwrap();
        // Bob's transcript diverges before the decrypt.
        bob.mix_hash(b"divergence");

        let ct = alice.encrypt_and_hash(b"secret").unwrap();
        assert_eq!(bob.decrypt_and_hash(&ct).unwrap_err(), Error::AuthFailed);
    }
}
