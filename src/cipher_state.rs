use std::sync::Arc;

use zeroize::Zeroizing;

use crate::crypto::cipher::{Cipher, KEY_LEN, TAG_LEN};
use crate::error::Error;
use crate::rekey::Rekeyer;

/// An AEAD channel under a single derived key with a monotone nonce.
///
/// During the handshake each party holds one `CipherState` inside its
/// symmetric state; after `split()` each party owns two, one per
/// direction. A state with no key passes data through unchanged.
pub struct CipherState {
    cipher: Box<dyn Cipher>,
    rekeyer: Option<Arc<dyn Rekeyer>>,
    key: Option<Zeroizing<[u8; KEY_LEN]>>,
    nonce: u64,
}

impl CipherState {
    pub(crate) fn new(cipher: Box<dyn Cipher>, rekeyer: Option<Arc<dyn Rekeyer>>) -> Self {
        Self {
            cipher,
            rekeyer,
            key: None,
            nonce: 0,
        }
    }

    /// Install `key` and reset the nonce to zero. An all-zero key puts
    /// the state into no-key mode instead.
    pub fn initialize_key(&mut self, key: [u8; KEY_LEN]) {
        self.reset();
        if key == [0u8; KEY_LEN] {
            return;
        }
        let key = Zeroizing::new(key);
        self.cipher.init_key(&key);
        self.key = Some(key);
    }

    /// Whether a non-zero key is installed.
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// The current nonce counter.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Overwrite the nonce counter. Meant for transports that deliver
    /// out of order; no safety checking is performed.
    pub fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }

    /// Encrypt `plaintext` bound to `ad`, then advance the nonce and
    /// consult the rekey policy. Without a key the plaintext is
    /// returned unchanged.
    pub fn encrypt_with_ad(&mut self, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        if !self.has_key() {
            return Ok(plaintext.to_vec());
        }
        let ciphertext = self.cipher.encrypt(self.nonce, ad, plaintext)?;
        self.post_increment()?;
        Ok(ciphertext)
    }

    /// Decrypt `ciphertext` bound to `ad`. On authentication failure
    /// the nonce is left unchanged. Without a key the ciphertext is
    /// returned unchanged.
    pub fn decrypt_with_ad(&mut self, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        if !self.has_key() {
            return Ok(ciphertext.to_vec());
        }
        let plaintext = self.cipher.decrypt(self.nonce, ad, ciphertext)?;
        self.post_increment()?;
        Ok(plaintext)
    }

    /// Rotate the key in place without touching the nonce, using the
    /// attached policy's derivation when one exists and the cipher's
    /// built-in derivation otherwise.
    pub fn rekey(&mut self) -> Result<(), Error> {
        if !self.has_key() {
            return Err(Error::MissingKey("cipher key"));
        }
        let new_key = match &self.rekeyer {
            Some(rekeyer) => rekeyer.rekey(self.cipher.as_ref())?,
            None => self.cipher.rekey()?,
        };
        self.install_key(new_key);
        Ok(())
    }

    /// Zero the key, drop the AEAD binding, and reset the nonce.
    pub fn reset(&mut self) {
        self.key = None;
        self.nonce = 0;
        self.cipher.reset();
    }

    pub(crate) fn overhead(&self) -> usize {
        if self.has_key() { TAG_LEN } else { 0 }
    }

    pub(crate) fn fresh_cipher(&self) -> Box<dyn Cipher> {
        self.cipher.fresh()
    }

    pub(crate) fn rekeyer_handle(&self) -> Option<Arc<dyn Rekeyer>> {
        self.rekeyer.clone()
    }

    #[cfg(test)]
    pub(crate) fn key_bytes(&self) -> Option<[u8; KEY_LEN]> {
        self.key.as_deref().copied()
    }

    fn install_key(&mut self, new_key: [u8; KEY_LEN]) {
        let new_key = Zeroizing::new(new_key);
        self.cipher.init_key(&new_key);
        self.key = Some(new_key);
    }

    /// Advance the nonce, then let the policy rotate the key.
    fn post_increment(&mut self) -> Result<(), Error> {
        self.nonce += 1;

        let Some(rekeyer) = self.rekeyer.clone() else {
            return Ok(());
        };
        if rekeyer.check_rekey(self.nonce)? {
            let new_key = rekeyer.rekey(self.cipher.as_ref())?;
            self.install_key(new_key);
            if rekeyer.reset_nonce() {
                self.nonce = 0;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cipher::{self, MAX_NONCE};
    use crate::rekey::DefaultRekeyer;

    fn chachapoly_state(rekeyer: Option<Arc<dyn Rekeyer>>) -> CipherState {
        CipherState::new(cipher::from_name("ChaChaPoly").unwrap(), rekeyer)
    }

    fn keyed_pair(key: [u8; KEY_LEN]) -> (CipherState, CipherState) {
        let mut a = chachapoly_state(None);
        a.initialize_key(key);
        let mut b = chachapoly_state(None);
        b.initialize_key(key);
        (a, b)
    }

    #[test]
    fn no_key_passthrough() {
        let mut cs = chachapoly_state(None);
        assert!(!cs.has_key());
        assert_eq!(cs.encrypt_with_ad(b"", b"hello").unwrap(), b"hello");
        assert_eq!(cs.decrypt_with_ad(b"", b"hello").unwrap(), b"hello");
        assert_eq!(cs.nonce(), 0);
    }

    #[test]
    fn zero_key_means_no_key() {
        let mut cs = chachapoly_state(None);
        cs.initialize_key([0u8; KEY_LEN]);
        assert!(!cs.has_key());
        assert_eq!(cs.overhead(), 0);
    }

    #[test]
    fn encrypt_decrypt_round_trip_tracks_nonce() {
        let (mut enc, mut dec) = keyed_pair([0x42; KEY_LEN]);
        for i in 0..4u64 {
            let ct = enc.encrypt_with_ad(b"ad", b"noise protocol").unwrap();
            let pt = dec.decrypt_with_ad(b"ad", &ct).unwrap();
            assert_eq!(pt, b"noise protocol");
            assert_eq!(dec.nonce(), i + 1);
        }
    }

    #[test]
    fn failed_decrypt_leaves_nonce_unchanged() {
        let (mut enc, mut dec) = keyed_pair([0x42; KEY_LEN]);
        let mut ct = enc.encrypt_with_ad(b"", b"payload").unwrap();
        ct[0] ^= 0x01;
        assert_eq!(dec.decrypt_with_ad(b"", &ct).unwrap_err(), Error::AuthFailed);
        assert_eq!(dec.nonce(), 0);

        // The untampered message still decrypts afterwards.
        ct[0] ^= 0x01;
        assert_eq!(dec.decrypt_with_ad(b"", &ct).unwrap(), b"payload");
        assert_eq!(dec.nonce(), 1);
    }

    #[test]
    fn reserved_nonce_is_rejected_and_unchanged() {
        let mut key = [0xAB; KEY_LEN];
        key[KEY_LEN - 1] = 0x6B;
        let mut cs = chachapoly_state(None);
        cs.initialize_key(key);
        cs.set_nonce(MAX_NONCE);

        assert_eq!(
            cs.encrypt_with_ad(&[], b"msg").unwrap_err(),
            Error::NonceOverflow
        );
        assert_eq!(cs.nonce(), MAX_NONCE);
    }

    #[test]
    fn manual_rekey_keeps_both_sides_in_sync() {
        let (mut enc, mut dec) = keyed_pair([0x42; KEY_LEN]);
        enc.rekey().unwrap();
        dec.rekey().unwrap();

        let ct = enc.encrypt_with_ad(b"", b"after rekey").unwrap();
        assert_eq!(dec.decrypt_with_ad(b"", &ct).unwrap(), b"after rekey");
    }

    #[test]
    fn manual_rekey_without_key_fails() {
        let mut cs = chachapoly_state(None);
        assert_eq!(cs.rekey().unwrap_err(), Error::MissingKey("cipher key"));
    }

    #[test]
    fn interval_policy_rotates_in_lockstep() {
        let policy: Arc<dyn Rekeyer> = Arc::new(DefaultRekeyer::new(2, false).unwrap());
        let mut enc = chachapoly_state(Some(policy.clone()));
        enc.initialize_key([0x42; KEY_LEN]);
        let mut dec = chachapoly_state(Some(policy));
        dec.initialize_key([0x42; KEY_LEN]);

        // Five messages cross two rotation boundaries.
        for _ in 0..5 {
            let ct = enc.encrypt_with_ad(b"", b"tick").unwrap();
            assert_eq!(dec.decrypt_with_ad(b"", &ct).unwrap(), b"tick");
        }
        assert_ne!(enc.key_bytes().unwrap(), [0x42; KEY_LEN]);
    }

    #[test]
    fn nonce_reset_policy_zeroes_counter_after_rotation() {
        let policy: Arc<dyn Rekeyer> = Arc::new(DefaultRekeyer::new(3, true).unwrap());
        let mut cs = chachapoly_state(Some(policy));
        cs.initialize_key([0x42; KEY_LEN]);

        for _ in 0..3 {
            cs.encrypt_with_ad(b"", b"tick").unwrap();
        }
        assert_eq!(cs.nonce(), 0);
    }

    #[test]
    fn jumped_nonce_surfaces_corruption() {
        let policy: Arc<dyn Rekeyer> = Arc::new(DefaultRekeyer::new(10, true).unwrap());
        let mut cs = chachapoly_state(Some(policy));
        cs.initialize_key([0x42; KEY_LEN]);
        cs.set_nonce(25);

        assert_eq!(
            cs.encrypt_with_ad(b"", b"msg").unwrap_err(),
            Error::NonceCorrupted
        );
    }

    #[test]
    fn reset_clears_key_and_nonce() {
        let (mut cs, _) = keyed_pair([0x42; KEY_LEN]);
        cs.encrypt_with_ad(b"", b"x").unwrap();
        cs.reset();
        assert!(!cs.has_key());
        assert_eq!(cs.nonce(), 0);
    }
}
