//! End-to-end scenarios exercising two `Conversation`s talking to each
//! other in-process: handshake, encrypted exchange, tie-break,
//! fragmentation, replay, and disconnect.

use otr::policy::ConversationConfig;
use otr::{Conversation, DsaKeyPair};

fn pair() -> (Conversation, Conversation) {
    let mut rng = rand::thread_rng();
    let alice_dsa = DsaKeyPair::generate(&mut rng);
    let bob_dsa = DsaKeyPair::generate(&mut rng);
    (
        Conversation::new(ConversationConfig::default(), alice_dsa),
        Conversation::new(ConversationConfig::default(), bob_dsa),
    )
}

/// Drive messages back and forth until both sides stop producing output,
/// feeding each side's outbound straight into the other. Returns once both
/// queues are empty.
fn pump(alice: &mut Conversation, bob: &mut Conversation, mut alice_to_bob: Vec<Vec<u8>>, mut bob_to_alice: Vec<Vec<u8>>) {
    while !alice_to_bob.is_empty() || !bob_to_alice.is_empty() {
        let mut next_to_alice = Vec::new();
        let mut next_to_bob = Vec::new();
        for msg in alice_to_bob.drain(..) {
            let (_, out) = bob.receive(&msg).expect("bob receive");
            next_to_alice.extend(out);
        }
        for msg in bob_to_alice.drain(..) {
            let (_, out) = alice.receive(&msg).expect("alice receive");
            next_to_bob.extend(out);
        }
        alice_to_bob = next_to_bob;
        bob_to_alice = next_to_alice;
    }
}

#[test]
fn two_party_v3_handshake_reaches_encrypted_with_matching_ssid() {
    let (mut alice, mut bob) = pair();
    let commit = alice.query_message();
    let (_, out) = bob.receive(commit.as_bytes()).unwrap();
    pump(&mut alice, &mut bob, Vec::new(), out);

    assert_eq!(alice.state, otr::MessageState::Encrypted);
    assert_eq!(bob.state, otr::MessageState::Encrypted);
    assert_eq!(alice.ssid(), bob.ssid());
    assert!(alice.ssid().is_some());
}

#[test]
fn encrypted_exchange_round_trips_plaintext() {
    let (mut alice, mut bob) = pair();
    let commit = alice.query_message();
    let (_, out) = bob.receive(commit.as_bytes()).unwrap();
    pump(&mut alice, &mut bob, Vec::new(), out);

    let outbound = alice.send(b"hello bob").unwrap();
    let mut plaintext = None;
    for msg in outbound {
        let (p, _) = bob.receive(&msg).unwrap();
        plaintext = plaintext.or(p);
    }
    assert_eq!(plaintext.unwrap(), b"hello bob");
}

#[test]
fn disconnect_transitions_to_finished_and_blocks_further_sends() {
    let (mut alice, mut bob) = pair();
    let commit = alice.query_message();
    let (_, out) = bob.receive(commit.as_bytes()).unwrap();
    pump(&mut alice, &mut bob, Vec::new(), out);

    let disconnect = alice.end().unwrap();
    for msg in disconnect {
        bob.receive(&msg).unwrap();
    }
    assert_eq!(bob.state, otr::MessageState::Finished);
    assert!(bob.send(b"too late").is_err());
}

/// Both sides send a Query at the same time and each becomes committer
/// before either receives the other's DH-Commit. The tie-break in
/// `AkeMachine::on_dh_commit` must still converge both sides to a single,
/// matching ENCRYPTED session.
#[test]
fn simultaneous_dh_commit_tie_break_still_converges() {
    let (mut alice, mut bob) = pair();
    let alice_query = alice.query_message();
    let bob_query = bob.query_message();

    let (_, alice_to_bob) = bob.receive(alice_query.as_bytes()).unwrap();
    let (_, bob_to_alice) = alice.receive(bob_query.as_bytes()).unwrap();

    pump(&mut alice, &mut bob, alice_to_bob, bob_to_alice);

    assert_eq!(alice.state, otr::MessageState::Encrypted);
    assert_eq!(bob.state, otr::MessageState::Encrypted);
    assert_eq!(alice.ssid(), bob.ssid());
}

#[test]
fn replayed_data_message_is_rejected_after_handshake() {
    let (mut alice, mut bob) = pair();
    let commit = alice.query_message();
    let (_, out) = bob.receive(commit.as_bytes()).unwrap();
    pump(&mut alice, &mut bob, Vec::new(), out);

    let outbound = alice.send(b"only once").unwrap();
    for msg in &outbound {
        let (plaintext, _) = bob.receive(msg).unwrap();
        assert_eq!(plaintext.unwrap(), b"only once");
    }
    for msg in &outbound {
        assert!(bob.receive(msg).is_err());
    }
}

#[test]
fn long_message_is_fragmented_and_reassembles_out_of_order() {
    let mut rng = rand::thread_rng();
    let alice_dsa = DsaKeyPair::generate(&mut rng);
    let bob_dsa = DsaKeyPair::generate(&mut rng);
    let mut alice = Conversation::new(
        ConversationConfig { fragment_size: Some(200), ..ConversationConfig::default() },
        alice_dsa,
    );
    let mut bob = Conversation::new(ConversationConfig::default(), bob_dsa);

    let commit = alice.query_message();
    let (_, out) = bob.receive(commit.as_bytes()).unwrap();
    pump(&mut alice, &mut bob, Vec::new(), out);

    let long_message = "A".repeat(700);
    let fragments = alice.send(long_message.as_bytes()).unwrap();
    assert!(fragments.len() > 1, "expected more than one fragment for a 700-byte message");

    // Start assembly, then skip ahead: fragment 3 arriving before fragment 2
    // must reset the in-progress buffer rather than splicing it in wrong.
    if fragments.len() >= 3 {
        let (p, _) = bob.receive(&fragments[0]).unwrap();
        assert!(p.is_none());
        let (p, _) = bob.receive(&fragments[2]).unwrap();
        assert!(p.is_none());
    }

    let mut plaintext = None;
    for msg in &fragments {
        let (p, _) = bob.receive(msg).unwrap();
        plaintext = plaintext.or(p);
    }
    assert_eq!(plaintext.unwrap(), long_message.as_bytes());
}
