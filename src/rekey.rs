//! Rekey policies for transport-phase cipher states.
//!
//! A policy is consulted after every successful encryption or
//! decryption. The default rotates the key every `interval` messages
//! using the cipher's built-in derivation; custom policies implement
//! [`Rekeyer`] and are handed to the builder.

use crate::crypto::cipher::{Cipher, KEY_LEN};
use crate::error::Error;

/// Decides when and how a cipher state rotates its key.
pub trait Rekeyer: Send + Sync {
    /// Whether a rotation is due at `nonce` (the value after the
    /// post-operation increment). An error here fails the operation
    /// that triggered the check.
    fn check_rekey(&self, nonce: u64) -> Result<bool, Error>;

    /// Derive the replacement key. `cipher` is still bound to the old
    /// key, so derivations may be a function of it.
    fn rekey(&self, cipher: &dyn Cipher) -> Result<[u8; KEY_LEN], Error>;

    /// Whether the nonce resets to zero after a rotation.
    fn reset_nonce(&self) -> bool;

    /// The configured number of messages between rotations.
    fn interval(&self) -> u64;
}

/// The interval policy: rotate every `interval` messages via the
/// cipher's built-in max-nonce derivation.
#[derive(Debug)]
pub struct DefaultRekeyer {
    interval: u64,
    reset_nonce: bool,
}

impl DefaultRekeyer {
    /// `interval` must be non-zero. `reset_nonce` additionally arms a
    /// corrupted-counter check: a nonce past the interval can only be
    /// reached by a `set_nonce` jump over a rotation boundary.
    pub fn new(interval: u64, reset_nonce: bool) -> Result<Self, Error> {
        if interval == 0 {
            return Err(Error::InvalidRekeyInterval);
        }
        Ok(Self {
            interval,
            reset_nonce,
        })
    }
}

impl Rekeyer for DefaultRekeyer {
    fn check_rekey(&self, nonce: u64) -> Result<bool, Error> {
        if self.reset_nonce && nonce > self.interval {
            return Err(Error::NonceCorrupted);
        }
        Ok(nonce % self.interval == 0)
    }

    fn rekey(&self, cipher: &dyn Cipher) -> Result<[u8; KEY_LEN], Error> {
        cipher.rekey()
    }

    fn reset_nonce(&self) -> bool {
        self.reset_nonce
    }

    fn interval(&self) -> u64 {
        self.interval
    }
}
