//! Byte-level interoperability against the `snow` crate.
//!
//! Every suite runs twice, with enoki on each side of the wire, and
//! finishes with transport traffic in both directions plus a handshake
//! hash comparison.

use enoki::crypto::dh;
use enoki::pattern::{self, Direction, Token};
use enoki::{Builder, HandshakeState};

const PROLOGUE: &[u8] = b"interop";

struct SuiteKeys {
    init_priv: Vec<u8>,
    init_pub: Vec<u8>,
    resp_priv: Vec<u8>,
    resp_pub: Vec<u8>,
    psks: Vec<(usize, [u8; 32])>,
    init_knows_rs: bool,
    resp_knows_rs: bool,
}

/// Generate key material for a 25519 suite and read the pattern's
/// pre-messages to see who must know whose static up front.
fn keys_for(protocol: &str) -> SuiteKeys {
    let pattern_name = protocol.split('_').nth(1).unwrap();
    let pattern = pattern::from_name(pattern_name).unwrap();
    let curve = dh::from_name("25519").unwrap();

    let init = curve.generate_keypair().unwrap();
    let resp = curve.generate_keypair().unwrap();

    let psks = pattern
        .modifier()
        .map(|m| m.psk_indexes.clone())
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, position)| (position, [i as u8 + 0x51; 32]))
        .collect();

    SuiteKeys {
        init_priv: init.bytes(),
        init_pub: init.public().bytes().to_vec(),
        resp_priv: resp.bytes(),
        resp_pub: resp.public().bytes().to_vec(),
        psks,
        init_knows_rs: pattern
            .pre_messages()
            .iter()
            .any(|l| l.direction == Direction::ToInitiator && l.tokens.contains(&Token::S)),
        resp_knows_rs: pattern
            .pre_messages()
            .iter()
            .any(|l| l.direction == Direction::ToResponder && l.tokens.contains(&Token::S)),
    }
}

fn build_enoki(protocol: &str, keys: &SuiteKeys, initiator: bool) -> HandshakeState {
    let (local, remote_pub, knows_rs) = if initiator {
        (&keys.init_priv, &keys.resp_pub, keys.init_knows_rs)
    } else {
        (&keys.resp_priv, &keys.init_pub, keys.resp_knows_rs)
    };
    let mut builder = Builder::new(protocol).prologue(PROLOGUE).local_static(local);
    if knows_rs {
        builder = builder.remote_static(remote_pub);
    }
    for (_, psk) in &keys.psks {
        builder = builder.psk(psk);
    }
    if initiator {
        builder.build_initiator().unwrap()
    } else {
        builder.build_responder().unwrap()
    }
}

fn build_snow(protocol: &str, keys: &SuiteKeys, initiator: bool) -> snow::HandshakeState {
    let (local, remote_pub, knows_rs) = if initiator {
        (&keys.init_priv, &keys.resp_pub, keys.init_knows_rs)
    } else {
        (&keys.resp_priv, &keys.init_pub, keys.resp_knows_rs)
    };
    let mut builder = snow::Builder::new(protocol.parse().unwrap())
        .prologue(PROLOGUE)
        .local_private_key(local);
    if knows_rs {
        builder = builder.remote_public_key(remote_pub);
    }
    for (position, psk) in &keys.psks {
        builder = builder.psk(*position as u8, psk);
    }
    if initiator {
        builder.build_initiator().unwrap()
    } else {
        builder.build_responder().unwrap()
    }
}

/// enoki initiator against a snow responder.
fn run_enoki_initiator(protocol: &str) {
    let keys = keys_for(protocol);
    let mut initiator = build_enoki(protocol, &keys, true);
    let mut responder = build_snow(protocol, &keys, false);

    let mut buf = vec![0u8; 65535];
    let mut payload_buf = vec![0u8; 65535];
    let payloads: &[&[u8]] = &[b"msg one", b"msg two", b"msg three", b"msg four"];

    let mut turn = 0;
    while !initiator.is_finished() {
        if turn % 2 == 0 {
            let message = initiator.write_message(payloads[turn]).unwrap();
            let len = responder.read_message(&message, &mut payload_buf).unwrap();
            assert_eq!(&payload_buf[..len], payloads[turn]);
        } else {
            let len = responder.write_message(payloads[turn], &mut buf).unwrap();
            let received = initiator.read_message(&buf[..len]).unwrap();
            assert_eq!(received, payloads[turn]);
        }
        turn += 1;
    }
    assert!(responder.is_handshake_finished());
    assert_eq!(initiator.handshake_hash(), responder.get_handshake_hash());

    let mut initiator = initiator.into_transport().unwrap();
    let mut responder = responder.into_transport_mode().unwrap();

    let wire = initiator.write_message(b"enoki to snow").unwrap();
    let len = responder.read_message(&wire, &mut payload_buf).unwrap();
    assert_eq!(&payload_buf[..len], b"enoki to snow");

    let len = responder.write_message(b"snow to enoki", &mut buf).unwrap();
    assert_eq!(
        initiator.read_message(&buf[..len]).unwrap(),
        b"snow to enoki"
    );
}

/// snow initiator against an enoki responder.
fn run_snow_initiator(protocol: &str) {
    let keys = keys_for(protocol);
    let mut initiator = build_snow(protocol, &keys, true);
    let mut responder = build_enoki(protocol, &keys, false);

    let mut buf = vec![0u8; 65535];
    let payloads: &[&[u8]] = &[b"msg one", b"msg two", b"msg three", b"msg four"];

    let mut turn = 0;
    while !responder.is_finished() {
        if turn % 2 == 0 {
            let len = initiator.write_message(payloads[turn], &mut buf).unwrap();
            let received = responder.read_message(&buf[..len]).unwrap();
            assert_eq!(received, payloads[turn]);
        } else {
            let message = responder.write_message(payloads[turn]).unwrap();
            let len = initiator.read_message(&message, &mut buf).unwrap();
            assert_eq!(&buf[..len], payloads[turn]);
        }
        turn += 1;
    }
    assert!(initiator.is_handshake_finished());
    assert_eq!(responder.handshake_hash(), initiator.get_handshake_hash());

    let mut initiator = initiator.into_transport_mode().unwrap();
    let mut responder = responder.into_transport().unwrap();

    let len = initiator.write_message(b"snow to enoki", &mut buf).unwrap();
    assert_eq!(
        responder.read_message(&buf[..len]).unwrap(),
        b"snow to enoki"
    );

    let wire = responder.write_message(b"enoki to snow").unwrap();
    let mut payload_buf = vec![0u8; 65535];
    let len = initiator.read_message(&wire, &mut payload_buf).unwrap();
    assert_eq!(&payload_buf[..len], b"enoki to snow");
}

fn run_both_ways(protocol: &str) {
    run_enoki_initiator(protocol);
    run_snow_initiator(protocol);
}

#[test]
fn nn_chachapoly_blake2s() {
    run_both_ways("Noise_NN_25519_ChaChaPoly_BLAKE2s");
}

#[test]
fn xx_chachapoly_sha256() {
    run_both_ways("Noise_XX_25519_ChaChaPoly_SHA256");
}

#[test]
fn ik_chachapoly_blake2s() {
    run_both_ways("Noise_IK_25519_ChaChaPoly_BLAKE2s");
}

#[test]
fn nk_aesgcm_sha512() {
    run_both_ways("Noise_NK_25519_AESGCM_SHA512");
}

#[test]
fn xk_aesgcm_blake2b() {
    run_both_ways("Noise_XK_25519_AESGCM_BLAKE2b");
}

#[test]
fn in_aesgcm_sha256() {
    run_both_ways("Noise_IN_25519_AESGCM_SHA256");
}

#[test]
fn nn_psk0() {
    run_both_ways("Noise_NNpsk0_25519_ChaChaPoly_SHA256");
}

#[test]
fn xx_psk3() {
    run_both_ways("Noise_XXpsk3_25519_AESGCM_BLAKE2b");
}

#[test]
fn ik_psk2() {
    run_both_ways("Noise_IKpsk2_25519_ChaChaPoly_BLAKE2s");
}

#[test]
fn empty_payload_messages_interop() {
    let protocol = "Noise_XX_25519_ChaChaPoly_SHA256";
    let keys = keys_for(protocol);
    let mut initiator = build_enoki(protocol, &keys, true);
    let mut responder = build_snow(protocol, &keys, false);

    let mut buf = vec![0u8; 65535];
    let message = initiator.write_message(&[]).unwrap();
    assert_eq!(responder.read_message(&message, &mut buf).unwrap(), 0);

    let len = responder.write_message(&[], &mut buf).unwrap();
    assert_eq!(initiator.read_message(&buf[..len]).unwrap(), b"");

    let message = initiator.write_message(&[]).unwrap();
    assert_eq!(responder.read_message(&message, &mut buf).unwrap(), 0);

    assert!(initiator.is_finished());
    assert!(responder.is_handshake_finished());
}
