use thiserror::Error;

use crate::handshake_state::Role;
use crate::pattern::{Direction, Token};

/// Errors surfaced by handshake construction, the message loop, and the
/// transport-phase cipher states.
///
/// Nothing is retried internally; every error is terminal for the
/// handshake or session that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The nonce counter reached the reserved value 2^64-1.
    #[error("nonce has reached the reserved maximum value")]
    NonceOverflow,

    /// AEAD authentication failed. The cipher nonce is left unchanged.
    #[error("aead authentication failed")]
    AuthFailed,

    /// The protocol name is not `Noise_<pattern>_<dh>_<cipher>_<hash>`,
    /// or exceeds 255 bytes.
    #[error("invalid protocol name")]
    InvalidProtocolName,

    /// A protocol-name component has no registry entry.
    #[error("component '{0}' is not supported")]
    UnsupportedComponent(String),

    /// The pattern name is not uppercase-alphanumeric.
    #[error("invalid handshake pattern name")]
    InvalidPatternName,

    /// A pattern-name modifier is neither `fallback` nor `psk<digits>`.
    #[error("invalid handshake modifier name")]
    InvalidModifierName,

    /// The pattern body violates a structural rule.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// The pattern cursor and the requested operation are out of step:
    /// `write_message`/`read_message` after the handshake completed, or
    /// transport access before it did.
    #[error("message pattern already exhausted")]
    PatternOverflow,

    /// A `psk` token was processed with no pre-shared key left.
    #[error("psk index overflow")]
    PskOverflow,

    /// A supplied pre-shared key is not exactly 32 bytes.
    #[error("psk must be exactly 32 bytes")]
    InvalidPskSize,

    /// The number of supplied PSKs does not match the pattern's psk
    /// modifiers.
    #[error("psk mode: expected {expected} psks, got {got}")]
    MismatchedPsks { expected: usize, got: usize },

    /// A message was written or read against the direction of the
    /// current pattern line.
    #[error("{role} cannot process a line in direction {line}")]
    InvalidDirection { role: Role, line: Direction },

    /// The incoming message is shorter than the current token requires.
    #[error("message truncated while reading a token")]
    InvalidPayload,

    /// A key slot the pattern is about to fill is already occupied.
    #[error("{0} is not empty")]
    KeyNotEmpty(&'static str),

    /// A key slot the pattern needs is empty.
    #[error("missing key: {0}")]
    MissingKey(&'static str),

    /// A token other than `ee`, `es`, `se` or `ss` reached the DH step.
    #[error("invalid token during dh: {0}")]
    InvalidDhToken(Token),

    /// A single message exceeds 65535 bytes.
    #[error("message size exceeds 65535 bytes")]
    MessageOverflow,

    /// The chaining key is not HASHLEN bytes.
    #[error("chaining key size invalid")]
    InvalidChainingKey,

    /// HKDF input key material is not 0, 32 or DHLEN bytes.
    #[error("hkdf key size must be 0, 32, or dhlen")]
    InvalidKeySize,

    /// HKDF was asked for an output count other than 2 or 3.
    #[error("hkdf num must be 2 or 3")]
    InvalidHkdfNum,

    /// The rekey policy found the nonce past a rotation boundary,
    /// usually after a `set_nonce` jump.
    #[error("nonce is corrupted, a new handshake is required")]
    NonceCorrupted,

    /// A public or private key failed to load, or a DH produced a
    /// degenerate output.
    #[error("invalid key material")]
    BadKey,

    /// The default rekey policy was configured with interval 0.
    #[error("rekey interval cannot be 0")]
    InvalidRekeyInterval,
}
