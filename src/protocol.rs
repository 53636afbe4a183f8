//! Protocol-name parsing and the handshake builder.

use std::sync::Arc;

use crate::cipher_state::CipherState;
use crate::crypto::cipher::Cipher;
use crate::crypto::dh::Curve;
use crate::crypto::hash::Hash;
use crate::crypto::{cipher, dh, hash};
use crate::error::Error;
use crate::handshake_state::{HandshakeState, Role};
use crate::pattern::{self, HandshakePattern};
use crate::rekey::{DefaultRekeyer, Rekeyer};
use crate::symmetric_state::SymmetricState;

/// The mandatory prefix of every protocol name.
pub const NOISE_PREFIX: &str = "Noise";

const DEFAULT_REKEY_INTERVAL: u64 = 10000;
const DEFAULT_RESET_NONCE: bool = true;

#[derive(Debug)]
pub(crate) struct Components {
    pub(crate) pattern: Arc<HandshakePattern>,
    pub(crate) curve: Box<dyn Curve>,
    pub(crate) cipher: Box<dyn Cipher>,
    pub(crate) hash: Box<dyn Hash>,
}

/// Split `Noise_<pattern>_<dh>_<cipher>_<hash>` and resolve each
/// component from its registry.
pub(crate) fn parse_protocol_name(name: &str) -> Result<Components, Error> {
    let components: Vec<&str> = name.split('_').collect();
    if components.len() != 5 || components[0] != NOISE_PREFIX {
        return Err(Error::InvalidProtocolName);
    }

    Ok(Components {
        pattern: pattern::from_name(components[1])?,
        curve: dh::from_name(components[2])?,
        cipher: cipher::from_name(components[3])?,
        hash: hash::from_name(components[4])?,
    })
}

enum RekeySetting {
    Default,
    Disabled,
    Interval { interval: u64, reset_nonce: bool },
    Custom(Arc<dyn Rekeyer>),
}

/// Builds a [`HandshakeState`] from a protocol name plus the caller's
/// key material and options.
///
/// ```no_run
/// # fn main() -> Result<(), enoki::Error> {
/// let mut initiator = enoki::Builder::new("Noise_NN_25519_ChaChaPoly_BLAKE2s")
///     .prologue(b"demo")
///     .build_initiator()?;
/// let message = initiator.write_message(&[])?;
/// # Ok(())
/// # }
/// ```
pub struct Builder<'a> {
    name: &'a str,
    prologue: &'a [u8],
    local_static: Option<&'a [u8]>,
    local_ephemeral: Option<&'a [u8]>,
    remote_static: Option<&'a [u8]>,
    remote_ephemeral: Option<&'a [u8]>,
    psks: Vec<&'a [u8]>,
    rekey: RekeySetting,
    auto_keygen: bool,
}

impl<'a> Builder<'a> {
    /// Start a builder for the given protocol name.
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            prologue: &[],
            local_static: None,
            local_ephemeral: None,
            remote_static: None,
            remote_ephemeral: None,
            psks: Vec::new(),
            rekey: RekeySetting::Default,
            auto_keygen: false,
        }
    }

    /// Context bytes mixed into the transcript before the handshake.
    /// Both peers must supply identical prologues.
    pub fn prologue(mut self, prologue: &'a [u8]) -> Self {
        self.prologue = prologue;
        self
    }

    /// The local static private key (`s`). Required when the pattern
    /// uses it, unless auto-keygen is on.
    pub fn local_static(mut self, key: &'a [u8]) -> Self {
        self.local_static = Some(key);
        self
    }

    /// A pre-agreed local ephemeral private key (`e`), consumed by the
    /// first `e` token this side writes. Normal handshakes generate
    /// ephemerals internally; this knob exists for compound protocols
    /// and deterministic test vectors.
    pub fn local_ephemeral(mut self, key: &'a [u8]) -> Self {
        self.local_ephemeral = Some(key);
        self
    }

    /// The remote static public key (`rs`), for patterns whose
    /// pre-messages assume it is known.
    pub fn remote_static(mut self, key: &'a [u8]) -> Self {
        self.remote_static = Some(key);
        self
    }

    /// The remote ephemeral public key (`re`), for compound protocols
    /// whose pre-messages carry it.
    pub fn remote_ephemeral(mut self, key: &'a [u8]) -> Self {
        self.remote_ephemeral = Some(key);
        self
    }

    /// Append a 32-byte pre-shared key. Call once per `psk` modifier,
    /// in modifier order.
    pub fn psk(mut self, psk: &'a [u8]) -> Self {
        self.psks.push(psk);
        self
    }

    /// Use a custom rekey policy for the transport cipher states.
    pub fn rekeyer(mut self, rekeyer: Arc<dyn Rekeyer>) -> Self {
        self.rekey = RekeySetting::Custom(rekeyer);
        self
    }

    /// Use the interval policy with custom parameters. Interval zero
    /// fails at build time.
    pub fn rekey_interval(mut self, interval: u64, reset_nonce: bool) -> Self {
        self.rekey = RekeySetting::Interval {
            interval,
            reset_nonce,
        };
        self
    }

    /// Disable key rotation entirely.
    pub fn no_rekey(mut self) -> Self {
        self.rekey = RekeySetting::Disabled;
        self
    }

    /// Generate missing local keys instead of failing: ephemerals
    /// anywhere, statics where the message pattern transmits them.
    pub fn auto_keygen(mut self, enabled: bool) -> Self {
        self.auto_keygen = enabled;
        self
    }

    /// Build the initiator-side handshake state.
    pub fn build_initiator(self) -> Result<HandshakeState, Error> {
        self.build(Role::Initiator)
    }

    /// Build the responder-side handshake state.
    pub fn build_responder(self) -> Result<HandshakeState, Error> {
        self.build(Role::Responder)
    }

    fn build(self, role: Role) -> Result<HandshakeState, Error> {
        if self.name.is_empty() || self.name.len() > 255 {
            return Err(Error::InvalidProtocolName);
        }
        let components = parse_protocol_name(self.name)?;

        let rekeyer: Option<Arc<dyn Rekeyer>> = match self.rekey {
            RekeySetting::Default => Some(Arc::new(DefaultRekeyer::new(
                DEFAULT_REKEY_INTERVAL,
                DEFAULT_RESET_NONCE,
            )?)),
            RekeySetting::Disabled => None,
            RekeySetting::Interval {
                interval,
                reset_nonce,
            } => Some(Arc::new(DefaultRekeyer::new(interval, reset_nonce)?)),
            RekeySetting::Custom(rekeyer) => Some(rekeyer),
        };

        let curve: Arc<dyn Curve> = Arc::from(components.curve);
        let s = self
            .local_static
            .map(|bytes| curve.load_private(bytes))
            .transpose()?;
        let e = self
            .local_ephemeral
            .map(|bytes| curve.load_private(bytes))
            .transpose()?;
        let rs = self
            .remote_static
            .map(|bytes| curve.load_public(bytes))
            .transpose()?;
        let re = self
            .remote_ephemeral
            .map(|bytes| curve.load_public(bytes))
            .transpose()?;

        let cs = CipherState::new(components.cipher, rekeyer);
        let ss = SymmetricState::new(cs, components.hash, curve, self.name.as_bytes());
        let psks = self.psks.iter().map(|psk| psk.to_vec()).collect();

        tracing::debug!(protocol = self.name, role = %role, "building handshake state");
        HandshakeState::new(
            ss,
            self.prologue,
            role,
            components.pattern,
            s,
            e,
            rs,
            re,
            psks,
            self.auto_keygen,
        )
    }
}

/// One-call construction with auto-keygen on and the default rekey
/// policy, for protocols whose key material can all be generated on
/// the spot. PSK-mode patterns and known-key pre-messages need the
/// [`Builder`].
pub fn new_protocol(name: &str, prologue: &[u8], role: Role) -> Result<HandshakeState, Error> {
    let builder = Builder::new(name).prologue(prologue).auto_keygen(true);
    match role {
        Role::Initiator => builder.build_initiator(),
        Role::Responder => builder.build_responder(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_resolves_all_components() {
        let components = parse_protocol_name("Noise_XX_25519_AESGCM_SHA256").unwrap();
        assert_eq!(components.pattern.name(), "XX");
        assert_eq!(components.curve.name(), "25519");
        assert_eq!(components.cipher.name(), "AESGCM");
        assert_eq!(components.hash.name(), "SHA256");
    }

    #[test]
    fn parse_rejects_bad_prefix_and_shape() {
        assert_eq!(
            parse_protocol_name("YYois_XX_25519_AESGCM_SHA256").unwrap_err(),
            Error::InvalidProtocolName
        );
        assert_eq!(
            parse_protocol_name("Noise_XX_25519_AESGCM").unwrap_err(),
            Error::InvalidProtocolName
        );
        assert_eq!(
            parse_protocol_name("Noise_XX_25519_AESGCM_SHA256_extra").unwrap_err(),
            Error::InvalidProtocolName
        );
    }

    #[test]
    fn parse_reports_the_unknown_component() {
        assert_eq!(
            parse_protocol_name("Noise_YY_25519_AESGCM_SHA256").unwrap_err(),
            Error::UnsupportedComponent("YY".into())
        );
        assert_eq!(
            parse_protocol_name("Noise_XX_25518_AESGCM_SHA256").unwrap_err(),
            Error::UnsupportedComponent("25518".into())
        );
        assert_eq!(
            parse_protocol_name("Noise_XX_25519_DES_SHA256").unwrap_err(),
            Error::UnsupportedComponent("DES".into())
        );
        assert_eq!(
            parse_protocol_name("Noise_XX_25519_AESGCM_MD5").unwrap_err(),
            Error::UnsupportedComponent("MD5".into())
        );
    }

    #[test]
    fn build_rejects_oversized_names() {
        let long = format!("Noise_XX_25519_AESGCM_{}", "A".repeat(256));
        assert_eq!(
            Builder::new(&long).build_initiator().unwrap_err(),
            Error::InvalidProtocolName
        );
        assert_eq!(
            Builder::new("").build_initiator().unwrap_err(),
            Error::InvalidProtocolName
        );
    }

    #[test]
    fn build_validates_psk_count() {
        let psk = [7u8; 32];
        let err = Builder::new("Noise_NNpsk0_25519_ChaChaPoly_SHA256")
            .build_initiator()
            .unwrap_err();
        assert_eq!(err, Error::MismatchedPsks { expected: 1, got: 0 });

        let err = Builder::new("Noise_NN_25519_ChaChaPoly_SHA256")
            .psk(&psk[..16])
            .build_initiator();
        // A psk on a psk-less pattern is ignored at count time but must
        // still be well-formed.
        assert_eq!(err.unwrap_err(), Error::InvalidPskSize);
    }

    #[test]
    fn build_validates_rekey_interval() {
        assert_eq!(
            Builder::new("Noise_NN_25519_ChaChaPoly_SHA256")
                .rekey_interval(0, true)
                .build_initiator()
                .unwrap_err(),
            Error::InvalidRekeyInterval
        );
    }

    #[test]
    fn build_requires_premessage_keys() {
        // NK's pre-message assumes the responder static is known.
        let err = Builder::new("Noise_NK_25519_ChaChaPoly_SHA256")
            .build_initiator()
            .unwrap_err();
        assert_eq!(err, Error::MissingKey("remote static key"));
    }

    #[test]
    fn missing_local_static_without_auto_keygen() {
        let err = Builder::new("Noise_XX_25519_ChaChaPoly_SHA256")
            .build_initiator()
            .unwrap_err();
        assert_eq!(err, Error::MissingKey("local static key"));
    }
}
