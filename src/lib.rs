#![deny(unsafe_code)]

//! # enoki
//!
//! A pattern-driven, sans-IO implementation of the Noise Protocol
//! Framework: declarative handshake patterns, name-indexed primitive
//! registries, and the CipherState / SymmetricState / HandshakeState
//! tower, yielding a pair of transport cipher states on completion.
//!
//! The engine consumes and produces byte strings; moving them is the
//! caller's problem.
//!
//! ## Supported components
//!
//! - Patterns: 3 one-way, 12 interactive and 23 deferred fundamental
//!   patterns, with `psk{N}` and `fallback` modifiers
//! - DH curves: 25519, 448, secp256k1
//! - Ciphers: ChaChaPoly, AESGCM
//! - Hashes: SHA256, SHA512, BLAKE2s, BLAKE2b
//!
//! ## Security properties
//!
//! - X25519/X448 degenerate shared-secret rejection
//! - Key material zeroized on drop
//! - Monotone nonces with the reserved value refused for encryption
//! - No recursive parsing, no panics on network input
//!
//! ## Example
//!
//! ```
//! # fn main() -> Result<(), enoki::Error> {
//! use enoki::{new_protocol, Role};
//!
//! let mut alice = new_protocol("Noise_NN_25519_ChaChaPoly_BLAKE2s", b"demo", Role::Initiator)?;
//! let mut bob = new_protocol("Noise_NN_25519_ChaChaPoly_BLAKE2s", b"demo", Role::Responder)?;
//!
//! let msg1 = alice.write_message(b"hello")?;
//! assert_eq!(bob.read_message(&msg1)?, b"hello");
//! let msg2 = bob.write_message(&[])?;
//! alice.read_message(&msg2)?;
//!
//! let mut alice = alice.into_transport()?;
//! let mut bob = bob.into_transport()?;
//! let wire = alice.write_message(b"over the top")?;
//! assert_eq!(bob.read_message(&wire)?, b"over the top");
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod pattern;
pub mod rekey;

mod cipher_state;
mod error;
mod handshake_state;
mod protocol;
mod symmetric_state;
mod transport;

pub use cipher_state::CipherState;
pub use error::Error;
pub use handshake_state::{HandshakeState, Role};
pub use protocol::{Builder, NOISE_PREFIX, new_protocol};
pub use transport::TransportState;

/// Maximum size of a single handshake or transport message in bytes.
pub const MAX_MESSAGE_LEN: usize = 65535;
