use std::fmt;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::MAX_MESSAGE_LEN;
use crate::cipher_state::CipherState;
use crate::crypto::cipher::{KEY_LEN, TAG_LEN};
use crate::crypto::dh::{PrivateKey, PublicKey};
use crate::error::Error;
use crate::pattern::{Direction, HandshakePattern, Token};
use crate::symmetric_state::SymmetricState;
use crate::transport::TransportState;

/// Which side of the handshake this state drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        })
    }
}

/// The pattern-driven handshake state machine.
///
/// Holds the symmetric state, the four key slots `(s, e, rs, re)`, the
/// PSK list, and a cursor over the pattern's message lines. Each
/// [`write_message`](Self::write_message) /
/// [`read_message`](Self::read_message) call processes exactly one
/// line; once the last line is processed the state splits into the two
/// transport cipher states.
///
/// Construct through [`Builder`](crate::Builder).
impl fmt::Debug for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeState")
            .field("role", &self.role)
            .field("pattern_cursor", &self.pattern_cursor)
            .field("psk_cursor", &self.psk_cursor)
            .finish_non_exhaustive()
    }
}

pub struct HandshakeState {
    pattern: Arc<HandshakePattern>,
    ss: SymmetricState,
    role: Role,
    auto_keygen: bool,

    s: Option<Box<dyn PrivateKey>>,
    e: Option<Box<dyn PrivateKey>>,
    rs: Option<Box<dyn PublicKey>>,
    re: Option<Box<dyn PublicKey>>,

    /// An ephemeral supplied up front, consumed by the first `e` token
    /// this side writes. Used for compound protocols and deterministic
    /// test vectors; normal handshakes generate ephemerals on the fly.
    pending_e: Option<Box<dyn PrivateKey>>,

    psks: Vec<Zeroizing<[u8; KEY_LEN]>>,
    pattern_cursor: usize,
    psk_cursor: usize,

    send_cipher: Option<CipherState>,
    recv_cipher: Option<CipherState>,
}

impl HandshakeState {
    /// Runs the construction sequence: prologue mix, pre-message
    /// processing, PSK validation, and key-slot validation against the
    /// message pattern.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        mut ss: SymmetricState,
        prologue: &[u8],
        role: Role,
        pattern: Arc<HandshakePattern>,
        s: Option<Box<dyn PrivateKey>>,
        e: Option<Box<dyn PrivateKey>>,
        rs: Option<Box<dyn PublicKey>>,
        re: Option<Box<dyn PublicKey>>,
        psks: Vec<Vec<u8>>,
        auto_keygen: bool,
    ) -> Result<Self, Error> {
        ss.mix_hash(prologue);

        let mut hs = Self {
            pattern,
            ss,
            role,
            auto_keygen,
            s,
            e: None,
            rs,
            re,
            pending_e: e,
            psks: Vec::with_capacity(psks.len()),
            pattern_cursor: 0,
            psk_cursor: 0,
            send_cipher: None,
            recv_cipher: None,
        };

        hs.process_pre_messages()?;
        hs.store_psks(psks)?;
        hs.validate_key_slots()?;
        Ok(hs)
    }

    /// Whether every message line has been processed.
    pub fn is_finished(&self) -> bool {
        self.pattern_cursor == self.pattern.messages().len()
    }

    /// This side's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The pattern driving this handshake.
    pub fn pattern(&self) -> &HandshakePattern {
        &self.pattern
    }

    /// The transcript hash; byte-identical on both peers after the
    /// handshake completes. Meant for channel binding after `split`.
    pub fn handshake_hash(&self) -> &[u8] {
        self.ss.handshake_hash()
    }

    /// The remote static key, once the pattern has delivered it.
    pub fn remote_static(&self) -> Option<&dyn PublicKey> {
        self.rs.as_deref()
    }

    /// Bytes the next message adds beyond the payload, or 0 when the
    /// handshake is finished.
    pub fn next_message_overhead(&self) -> usize {
        let Some(line) = self.pattern.messages().get(self.pattern_cursor) else {
            return 0;
        };
        let dhlen = self.ss.curve().dhlen();
        let mut keyed = self.ss.has_key();
        let mut overhead = 0;
        for &token in &line.tokens {
            match token {
                Token::E => {
                    overhead += dhlen;
                    if self.pattern.psk_mode() {
                        keyed = true;
                    }
                }
                Token::S => {
                    overhead += dhlen + if keyed { TAG_LEN } else { 0 };
                }
                _ => keyed = true,
            }
        }
        overhead + if keyed { TAG_LEN } else { 0 }
    }

    /// Produce the next handshake message carrying `payload`.
    ///
    /// Processes the current pattern line token by token, appends the
    /// encrypted payload, and advances the cursor. The final message
    /// triggers the split into transport cipher states.
    pub fn write_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        if payload.len() > MAX_MESSAGE_LEN {
            return Err(Error::MessageOverflow);
        }
        let pattern = self.pattern.clone();
        let line = pattern
            .messages()
            .get(self.pattern_cursor)
            .ok_or(Error::PatternOverflow)?;
        if !self.must_write(line.direction) {
            return Err(Error::InvalidDirection {
                role: self.role,
                line: line.direction,
            });
        }

        let mut buffer = Vec::with_capacity(self.next_message_overhead() + payload.len());
        for &token in &line.tokens {
            match token {
                Token::E => self.write_e(&mut buffer)?,
                Token::S => self.write_s(&mut buffer)?,
                Token::Psk => self.process_psk()?,
                dh_token => self.process_dh(dh_token)?,
            }
        }

        let ciphertext = self.ss.encrypt_and_hash(payload)?;
        buffer.extend_from_slice(&ciphertext);

        self.advance()?;
        Ok(buffer)
    }

    /// Consume the peer's next handshake message and return its
    /// decrypted payload.
    pub fn read_message(&mut self, message: &[u8]) -> Result<Vec<u8>, Error> {
        if message.len() > MAX_MESSAGE_LEN {
            return Err(Error::MessageOverflow);
        }
        let pattern = self.pattern.clone();
        let line = pattern
            .messages()
            .get(self.pattern_cursor)
            .ok_or(Error::PatternOverflow)?;
        if self.must_write(line.direction) {
            return Err(Error::InvalidDirection {
                role: self.role,
                line: line.direction,
            });
        }

        let mut rest = message;
        for &token in &line.tokens {
            rest = match token {
                Token::E => self.read_e(rest)?,
                Token::S => self.read_s(rest)?,
                Token::Psk => {
                    self.process_psk()?;
                    rest
                }
                dh_token => {
                    self.process_dh(dh_token)?;
                    rest
                }
            };
        }

        let plaintext = self.ss.decrypt_and_hash(rest)?;

        self.advance()?;
        Ok(plaintext)
    }

    /// Consume the completed handshake, yielding the transport state.
    pub fn into_transport(mut self) -> Result<TransportState, Error> {
        match (self.send_cipher.take(), self.recv_cipher.take()) {
            (Some(send), Some(recv)) => {
                let hash = self.ss.handshake_hash().to_vec();
                Ok(TransportState::new(hash, send, recv))
            }
            _ => Err(Error::PatternOverflow),
        }
    }

    /// Post-completion cleanup: wipes the symmetric state, key slots,
    /// PSKs, and any unclaimed transport cipher states. Running a new
    /// handshake requires a fresh build; there is no mid-handshake
    /// reset.
    pub fn reset(&mut self) {
        self.ss.reset();
        self.s = None;
        self.e = None;
        self.pending_e = None;
        self.rs = None;
        self.re = None;
        self.psks.clear();
        if let Some(mut cipher) = self.send_cipher.take() {
            cipher.reset();
        }
        if let Some(mut cipher) = self.recv_cipher.take() {
            cipher.reset();
        }
    }

    /// Whether this side writes lines flowing in `direction`.
    fn must_write(&self, direction: Direction) -> bool {
        match self.role {
            Role::Initiator => direction == Direction::ToResponder,
            Role::Responder => direction == Direction::ToInitiator,
        }
    }

    /// Pre-messages mix each listed public key into the transcript, in
    /// pattern order; in PSK mode ephemerals are additionally mixed
    /// into the chaining key.
    fn process_pre_messages(&mut self) -> Result<(), Error> {
        let pattern = self.pattern.clone();
        for line in pattern.pre_messages() {
            for &token in &line.tokens {
                match token {
                    Token::E => self.process_pre_e(line.direction)?,
                    Token::S => self.process_pre_s(line.direction)?,
                    _ => {
                        return Err(Error::InvalidPattern(
                            "pre-message lines may only contain e or s".to_owned(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn process_pre_e(&mut self, direction: Direction) -> Result<(), Error> {
        let key_bytes = if self.must_write(direction) {
            if self.e.is_none() {
                if let Some(pending) = self.pending_e.take() {
                    self.e = Some(pending);
                } else if self.auto_keygen {
                    self.e = Some(self.ss.curve().generate_keypair()?);
                } else {
                    return Err(Error::MissingKey("local ephemeral key"));
                }
            }
            match &self.e {
                Some(key) => key.public().bytes().to_vec(),
                None => return Err(Error::MissingKey("local ephemeral key")),
            }
        } else {
            match &self.re {
                Some(key) => key.bytes().to_vec(),
                None => return Err(Error::MissingKey("remote ephemeral key")),
            }
        };

        self.ss.mix_hash(&key_bytes);
        if self.pattern.psk_mode() {
            self.ss.mix_key(&key_bytes)?;
        }
        Ok(())
    }

    fn process_pre_s(&mut self, direction: Direction) -> Result<(), Error> {
        let key_bytes = if self.must_write(direction) {
            // A pre-message static is an identity the peer already
            // knows; synthesizing one here would be meaningless, so
            // auto-keygen does not apply.
            match &self.s {
                Some(key) => key.public().bytes().to_vec(),
                None => return Err(Error::MissingKey("local static key")),
            }
        } else {
            match &self.rs {
                Some(key) => key.bytes().to_vec(),
                None => return Err(Error::MissingKey("remote static key")),
            }
        };

        self.ss.mix_hash(&key_bytes);
        Ok(())
    }

    fn store_psks(&mut self, psks: Vec<Vec<u8>>) -> Result<(), Error> {
        if let Some(modifier) = self.pattern.modifier() {
            if psks.len() != modifier.psk_indexes.len() {
                return Err(Error::MismatchedPsks {
                    expected: modifier.psk_indexes.len(),
                    got: psks.len(),
                });
            }
        }
        for psk in psks {
            let bytes: [u8; KEY_LEN] =
                psk.as_slice().try_into().map_err(|_| Error::InvalidPskSize)?;
            self.psks.push(Zeroizing::new(bytes));
        }
        Ok(())
    }

    /// Every slot the message pattern will populate must be empty, and
    /// every slot it will consume must be present; a missing local
    /// static is synthesized when auto-keygen is on.
    fn validate_key_slots(&mut self) -> Result<(), Error> {
        let pattern = self.pattern.clone();
        for line in pattern.messages() {
            let writing = self.must_write(line.direction);
            for &token in &line.tokens {
                match token {
                    Token::E => {
                        if writing {
                            if self.e.is_some() {
                                return Err(Error::KeyNotEmpty("local ephemeral key"));
                            }
                        } else if self.re.is_some() {
                            return Err(Error::KeyNotEmpty("remote ephemeral key"));
                        }
                    }
                    Token::S => {
                        if writing {
                            if self.s.is_none() {
                                if !self.auto_keygen {
                                    return Err(Error::MissingKey("local static key"));
                                }
                                self.s = Some(self.ss.curve().generate_keypair()?);
                            }
                        } else if self.rs.is_some() {
                            return Err(Error::KeyNotEmpty("remote static key"));
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn write_e(&mut self, buffer: &mut Vec<u8>) -> Result<(), Error> {
        if self.e.is_some() {
            return Err(Error::KeyNotEmpty("local ephemeral key"));
        }
        let key = match self.pending_e.take() {
            Some(key) => key,
            None => self.ss.curve().generate_keypair()?,
        };
        let public = key.public().bytes().to_vec();
        buffer.extend_from_slice(&public);
        self.e = Some(key);

        self.ss.mix_hash(&public);
        if self.pattern.psk_mode() {
            self.ss.mix_key(&public)?;
        }
        Ok(())
    }

    fn read_e<'m>(&mut self, input: &'m [u8]) -> Result<&'m [u8], Error> {
        if self.re.is_some() {
            return Err(Error::KeyNotEmpty("remote ephemeral key"));
        }
        let dhlen = self.ss.curve().dhlen();
        if input.len() < dhlen {
            return Err(Error::InvalidPayload);
        }
        let re = self.ss.curve().load_public(&input[..dhlen])?;
        let public = re.bytes().to_vec();
        self.re = Some(re);

        self.ss.mix_hash(&public);
        if self.pattern.psk_mode() {
            self.ss.mix_key(&public)?;
        }
        Ok(&input[dhlen..])
    }

    fn write_s(&mut self, buffer: &mut Vec<u8>) -> Result<(), Error> {
        let public = match &self.s {
            Some(key) => key.public().bytes().to_vec(),
            None => return Err(Error::MissingKey("local static key")),
        };
        let encrypted = self.ss.encrypt_and_hash(&public)?;
        buffer.extend_from_slice(&encrypted);
        Ok(())
    }

    fn read_s<'m>(&mut self, input: &'m [u8]) -> Result<&'m [u8], Error> {
        if self.rs.is_some() {
            return Err(Error::KeyNotEmpty("remote static key"));
        }
        let temp_len = self.ss.curve().dhlen() + self.ss.overhead();
        if input.len() < temp_len {
            return Err(Error::InvalidPayload);
        }
        let data = self.ss.decrypt_and_hash(&input[..temp_len])?;
        self.rs = Some(self.ss.curve().load_public(&data)?);
        Ok(&input[temp_len..])
    }

    fn process_psk(&mut self) -> Result<(), Error> {
        let psk = self
            .psks
            .get(self.psk_cursor)
            .ok_or(Error::PskOverflow)?
            .clone();
        self.ss.mix_key_and_hash(psk.as_slice())?;
        self.psk_cursor += 1;
        Ok(())
    }

    /// DH pair selection: the token names the initiator-side key first,
    /// so each side maps it onto its own local/remote slots.
    fn process_dh(&mut self, token: Token) -> Result<(), Error> {
        let (local, local_name, remote, remote_name) = match (token, self.role) {
            (Token::Ee, _) => (&self.e, "local ephemeral key", &self.re, "remote ephemeral key"),
            (Token::Ss, _) => (&self.s, "local static key", &self.rs, "remote static key"),
            (Token::Es, Role::Initiator) => {
                (&self.e, "local ephemeral key", &self.rs, "remote static key")
            }
            (Token::Es, Role::Responder) => {
                (&self.s, "local static key", &self.re, "remote ephemeral key")
            }
            (Token::Se, Role::Initiator) => {
                (&self.s, "local static key", &self.re, "remote ephemeral key")
            }
            (Token::Se, Role::Responder) => {
                (&self.e, "local ephemeral key", &self.rs, "remote static key")
            }
            _ => return Err(Error::InvalidDhToken(token)),
        };

        let local = local.as_ref().ok_or(Error::MissingKey(local_name))?;
        let remote = remote.as_ref().ok_or(Error::MissingKey(remote_name))?;
        let shared = local.dh(remote.bytes())?;
        self.ss.mix_key(&shared)
    }

    fn advance(&mut self) -> Result<(), Error> {
        self.pattern_cursor += 1;
        if self.pattern_cursor < self.pattern.messages().len() {
            return Ok(());
        }

        let (c1, c2) = self.ss.split()?;
        match self.role {
            Role::Initiator => {
                self.send_cipher = Some(c1);
                self.recv_cipher = Some(c2);
            }
            Role::Responder => {
                self.send_cipher = Some(c2);
                self.recv_cipher = Some(c1);
            }
        }
        tracing::debug!(
            pattern = self.pattern.name(),
            role = %self.role,
            "handshake complete"
        );
        Ok(())
    }
}
