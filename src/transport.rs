use zeroize::Zeroize;

use crate::cipher_state::CipherState;
use crate::crypto::cipher::TAG_LEN;
use crate::error::Error;

/// Post-handshake transport encryption state: one [`CipherState`] per
/// direction plus the final handshake hash for channel binding.
///
/// Nonces run per direction, monotone from zero. Out-of-order
/// transports can reach into the cipher states directly and drive
/// `set_nonce` themselves.
pub struct TransportState {
    send: CipherState,
    recv: CipherState,
    handshake_hash: Vec<u8>,
}

impl TransportState {
    pub(crate) fn new(handshake_hash: Vec<u8>, send: CipherState, recv: CipherState) -> Self {
        Self {
            send,
            recv,
            handshake_hash,
        }
    }

    /// Encrypt a payload for the peer with no associated data.
    pub fn write_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        self.send.encrypt_with_ad(&[], payload)
    }

    /// Decrypt a message from the peer with no associated data.
    pub fn read_message(&mut self, message: &[u8]) -> Result<Vec<u8>, Error> {
        self.recv.decrypt_with_ad(&[], message)
    }

    /// Encrypt a payload bound to caller-chosen associated data. Both
    /// sides must agree on the associated data per message.
    pub fn write_message_with_ad(&mut self, ad: &[u8], payload: &[u8]) -> Result<Vec<u8>, Error> {
        self.send.encrypt_with_ad(ad, payload)
    }

    /// Decrypt a message bound to caller-chosen associated data.
    pub fn read_message_with_ad(&mut self, ad: &[u8], message: &[u8]) -> Result<Vec<u8>, Error> {
        self.recv.decrypt_with_ad(ad, message)
    }

    /// The final handshake hash, byte-identical on both peers.
    pub fn handshake_hash(&self) -> &[u8] {
        &self.handshake_hash
    }

    /// The AEAD tag overhead per transport message.
    pub fn overhead(&self) -> usize {
        TAG_LEN
    }

    /// Manually rotate the sending key.
    pub fn rekey_send(&mut self) -> Result<(), Error> {
        self.send.rekey()
    }

    /// Manually rotate the receiving key.
    pub fn rekey_recv(&mut self) -> Result<(), Error> {
        self.recv.rekey()
    }

    /// The sending cipher state, for nonce adapters.
    pub fn send_cipher_mut(&mut self) -> &mut CipherState {
        &mut self.send
    }

    /// The receiving cipher state, for nonce adapters.
    pub fn recv_cipher_mut(&mut self) -> &mut CipherState {
        &mut self.recv
    }
}

impl Drop for TransportState {
    fn drop(&mut self) {
        self.handshake_hash.zeroize();
    }
}
