//! Single-frame messaging between simulated devices.

mod common;

use common::*;
use wavemesh_core::{Did, Encryption, Frame, MessageId, NackReason, Nid, PacketClass, Pattern, Pid, UnitId};
use wavemesh_interfaces::SimMedium;
use wavemesh_node::{Destinations, EnqueueError, MessageClass};
use wavemesh_protocol::{Tick, TransactionError, TxPurpose};

#[test]
fn single_message_success() {
    let medium = SimMedium::new();
    let mut a = member(&medium, 3);
    let mut b = member(&medium, 7);
    let mut now = Tick::ZERO;

    let handle = send(&mut a, MessageClass::Single, 7, b"hello");
    assert!(run_until(&mut [&mut a, &mut b], &mut now, 500, |d| {
        !d[0].messages.hooks().outcomes.is_empty()
    }));

    let delivered = &b.messages.hooks().delivered;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].from, Did(3));
    assert_eq!(delivered[0].class, PacketClass::Single);
    assert_eq!(delivered[0].src_unit, UnitId(1));
    assert_eq!(delivered[0].dst_unit, UnitId(2));
    assert_eq!(delivered[0].data, b"hello");
    assert_eq!(delivered[0].hops, None);

    let outcome = &a.messages.hooks().outcomes[0];
    assert_eq!(outcome.tx, handle);
    assert_eq!(outcome.peer, Did(7));
    assert_eq!(outcome.purpose, TxPurpose::Application);
    assert_eq!(outcome.retries, 0);
    assert_eq!(outcome.result, Ok(None));

    assert_eq!(a.ctx.stats.transmissions, 1);
    assert_eq!(b.ctx.stats.transmissions, 1);
    assert_eq!(b.ctx.stats.delivered, 1);
    assert_eq!(a.messages.store().saves(), 0, "messaging never saves settings");
    assert_eq!(b.messages.store().saves(), 0);
}

#[test]
fn idempotent_receipt_answers_a_retransmission_without_redelivery() {
    let medium = SimMedium::new();
    let mut a = member(&medium, 3);
    let mut b = member(&medium, 7);
    let mut now = Tick::ZERO;

    // The first ACK is lost, so `a` times out and sends again.
    medium.drop_transmits(b.ctx.radio.id(), 1);
    send(&mut a, MessageClass::Single, 7, b"once");
    assert!(run_until(&mut [&mut a, &mut b], &mut now, 1_000, |d| {
        !d[0].messages.hooks().outcomes.is_empty()
    }));

    assert_eq!(b.messages.hooks().delivered.len(), 1);
    assert_eq!(b.ctx.stats.duplicates, 1);
    let outcome = &a.messages.hooks().outcomes[0];
    assert_eq!(outcome.result, Ok(None));
    assert_eq!(outcome.retries, 1);

    let acks: Vec<_> = medium
        .transmissions_from(b.ctx.radio.id())
        .into_iter()
        .map(|t| t.bytes)
        .collect();
    assert_eq!(acks.len(), 2);
    assert_eq!(acks[0], acks[1], "duplicate answered with the same response");
}

#[test]
fn retry_bound_then_timeout() {
    let medium = SimMedium::new();
    let mut a = member(&medium, 3);
    let mut now = Tick::ZERO;

    send(&mut a, MessageClass::Single, 9, b"anyone?");
    run(&mut [&mut a], &mut now, 2_000);

    let outcomes = &a.messages.hooks().outcomes;
    assert_eq!(outcomes.len(), 1, "exactly one outcome per handle");
    assert_eq!(outcomes[0].result, Err(TransactionError::Timeout));
    let max_retries = a.ctx.config().max_retries;
    assert_eq!(outcomes[0].retries, max_retries);
    assert_eq!(
        medium.transmissions_from(a.ctx.radio.id()).len(),
        usize::from(max_retries) + 1
    );
}

#[test]
fn fatal_nack_ends_the_transaction_at_once() {
    let medium = SimMedium::new();
    let mut a = member(&medium, 3);
    let mut b = member_with(&medium, 7, "", "[engine]\nsupports_block = false");
    let mut now = Tick::ZERO;

    let handle = send(&mut a, MessageClass::Block, 7, &[0x55; 40]);
    assert!(run_until(&mut [&mut a, &mut b], &mut now, 1_000, |d| {
        !d[0].messages.hooks().outcomes.is_empty()
    }));

    let outcome = &a.messages.hooks().outcomes[0];
    assert_eq!(outcome.tx, handle);
    assert_eq!(
        outcome.result,
        Err(TransactionError::NackedFatal {
            reason: NackReason::Unsupported,
            value: 0
        })
    );
    assert_eq!(a.ctx.engine.stats().retries, 0);
    assert!(b.messages.hooks().delivered.is_empty());
}

#[test]
fn fatality_hook_downgrades_a_nack_within_the_budget() {
    let medium = SimMedium::new();
    let mut a = member(&medium, 3);
    a.messages
        .hooks_mut()
        .fatality
        .push((NackReason::Unsupported, false));
    let mut b = member_with(&medium, 7, "", "[engine]\nsupports_block = false");
    let mut now = Tick::ZERO;

    send(&mut a, MessageClass::Block, 7, &[0x55; 40]);
    assert!(run_until(&mut [&mut a, &mut b], &mut now, 2_000, |d| {
        !d[0].messages.hooks().outcomes.is_empty()
    }));

    assert_eq!(
        a.messages.hooks().outcomes[0].result,
        Err(TransactionError::NackedRetryable {
            reason: NackReason::Unsupported,
            value: 0
        })
    );
    assert_eq!(
        a.ctx.engine.stats().retries,
        u64::from(a.ctx.config().max_retries)
    );
}

#[test]
fn multi_hop_relay_forwards_ciphertext_with_one_hop_fewer() {
    let medium = SimMedium::new();
    let mut a = member_with(
        &medium,
        3,
        "",
        "[engine]\nmax_hops = 2\n[[peers]]\ndid = 7\nmulti_hop = true",
    );
    let mut relay = member_with(&medium, 5, "relay = true", "[engine]\nmax_hops = 2");
    let mut b = member_with(&medium, 7, "", "[engine]\nmax_hops = 2");
    medium.chain(&[a.ctx.radio.id(), relay.ctx.radio.id(), b.ctx.radio.id()]);
    let mut now = Tick::ZERO;

    send(&mut a, MessageClass::Single, 7, b"far away");
    assert!(run_until(&mut [&mut a, &mut relay, &mut b], &mut now, 1_000, |d| {
        !d[0].messages.hooks().outcomes.is_empty()
    }));

    assert_eq!(a.messages.hooks().outcomes[0].result, Ok(None));
    let delivered = &b.messages.hooks().delivered;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].data, b"far away");
    assert_eq!(delivered[0].hops, Some(1));

    let original = Frame::parse(&medium.transmissions_from(a.ctx.radio.id())[0].bytes).unwrap();
    let forwarded = Frame::parse(&medium.transmissions_from(relay.ctx.radio.id())[0].bytes).unwrap();
    assert_eq!(original.hops, 2);
    assert_eq!(forwarded.hops, 1);
    assert_eq!(forwarded.payload(), original.payload());
    assert_eq!(forwarded.src, Did(3));
    assert_eq!(forwarded.dst, Did(7));

    // The ACK came back the same way, and the far end learned the route.
    assert_eq!(relay.ctx.stats.relayed, 2);
    assert!(relay.messages.hooks().delivered.is_empty());
    assert!(b.ctx.directory.lookup_peer(Did(3)).unwrap().multi_hop);
}

#[test]
fn retry_recovers_a_frame_lost_after_the_relay() {
    let medium = SimMedium::new();
    let mut a = member_with(
        &medium,
        3,
        "",
        "[engine]\nmax_hops = 2\n[[peers]]\ndid = 7\nmulti_hop = true",
    );
    let mut relay = member_with(&medium, 5, "relay = true", "[engine]\nmax_hops = 2");
    let mut b = member_with(&medium, 7, "", "[engine]\nmax_hops = 2");
    medium.chain(&[a.ctx.radio.id(), relay.ctx.radio.id(), b.ctx.radio.id()]);
    // The relay's first forward never reaches b.
    medium.drop_transmits(relay.ctx.radio.id(), 1);
    let mut now = Tick::ZERO;

    send(&mut a, MessageClass::Single, 7, b"second try");
    assert!(run_until(&mut [&mut a, &mut relay, &mut b], &mut now, 2_000, |d| {
        !d[0].messages.hooks().outcomes.is_empty()
    }));

    let outcome = &a.messages.hooks().outcomes[0];
    assert_eq!(outcome.result, Ok(None));
    assert_eq!(outcome.retries, 1);
    assert_eq!(medium.transmissions_from(a.ctx.radio.id()).len(), 2);
    let delivered = &b.messages.hooks().delivered;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].data, b"second try");
    // Both copies of the frame, then the ACK.
    assert_eq!(relay.ctx.stats.relayed, 3);
}

#[test]
fn relay_ignores_an_echo_of_a_frame_it_just_forwarded() {
    let medium = SimMedium::new();
    let mut a = member_with(&medium, 3, "", "[[peers]]\ndid = 7\nmulti_hop = true");
    let mut relay = member_with(&medium, 5, "relay = true", "");
    let mut now = Tick::ZERO;

    send(&mut a, MessageClass::Single, 7, b"echo");
    assert!(run_until(&mut [&mut a, &mut relay], &mut now, 100, |d| {
        d[1].ctx.stats.relayed == 1
    }));
    // The same frame heard again straight away, e.g. via a second path.
    let first = medium.transmissions_from(a.ctx.radio.id())[0].bytes.clone();
    medium.inject(relay.ctx.radio.id(), first);
    run(&mut [&mut relay], &mut now, 5);

    assert_eq!(relay.ctx.stats.relayed, 1);
    assert_eq!(medium.transmissions_from(relay.ctx.radio.id()).len(), 1);
}

#[test]
fn broadcast_reaches_everyone_without_acks() {
    let medium = SimMedium::new();
    let mut a = member(&medium, 3);
    let mut b = member(&medium, 5);
    let mut c = member(&medium, 7);
    let mut now = Tick::ZERO;

    let handles = a
        .messages
        .enqueue(
            &mut a.ctx,
            UnitId(1),
            MessageClass::Single,
            b"all",
            Destinations::Broadcast {
                pattern: Pattern(4),
                dst_unit: UnitId(9),
            },
        )
        .unwrap();
    assert_eq!(handles.len(), 1);
    run(&mut [&mut a, &mut b, &mut c], &mut now, 100);

    assert_eq!(a.messages.hooks().outcomes[0].result, Ok(None));
    for device in [&b, &c] {
        let delivered = &device.messages.hooks().delivered;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].data, b"all");
        assert_eq!(delivered[0].pattern, Pattern(4));
        assert_eq!(delivered[0].dst_unit, UnitId(9));
        assert_eq!(device.ctx.stats.transmissions, 0, "broadcasts are not answered");
    }
}

#[test]
fn assigned_pattern_fans_out_to_every_target() {
    let medium = SimMedium::new();
    let mut a = member_with(
        &medium,
        3,
        "",
        r#"
[[assignments]]
unit = 1
pattern = 2
targets = [{ did = 5, unit = 1 }, { did = 7, unit = 6 }]
"#,
    );
    let mut b = member(&medium, 5);
    let mut c = member(&medium, 7);
    let mut now = Tick::ZERO;

    let handles = a
        .messages
        .enqueue(
            &mut a.ctx,
            UnitId(1),
            MessageClass::Single,
            b"fan",
            Destinations::Assigned(Pattern(2)),
        )
        .unwrap();
    assert_eq!(handles.len(), 2);
    assert!(run_until(&mut [&mut a, &mut b, &mut c], &mut now, 1_000, |d| {
        d[0].messages.hooks().outcomes.len() == 2
    }));

    assert!(a.messages.hooks().outcomes.iter().all(|o| o.result == Ok(None)));
    assert_eq!(b.messages.hooks().delivered[0].dst_unit, UnitId(1));
    assert_eq!(c.messages.hooks().delivered[0].dst_unit, UnitId(6));

    let err = a
        .messages
        .enqueue(
            &mut a.ctx,
            UnitId(1),
            MessageClass::Single,
            b"fan",
            Destinations::Assigned(Pattern(3)),
        )
        .unwrap_err();
    assert_eq!(err, EnqueueError::NoTargets);
}

#[test]
fn cancellation_reports_aborted_once() {
    let medium = SimMedium::new();
    let mut a = member(&medium, 3);
    let mut now = Tick::ZERO;

    let handle = send(&mut a, MessageClass::Single, 9, b"never mind");
    run(&mut [&mut a], &mut now, 5);
    assert!(a.messages.cancel(&mut a.ctx, handle));
    run(&mut [&mut a], &mut now, 1_000);

    let outcomes = &a.messages.hooks().outcomes;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].tx, handle);
    assert_eq!(outcomes[0].result, Err(TransactionError::AbortedByApplication));
    assert!(!a.messages.cancel(&mut a.ctx, handle), "handle is gone");
}

#[test]
fn enqueue_refusals_queue_nothing() {
    let medium = SimMedium::new();
    let mut a = member_with(&medium, 3, "", "[engine]\nqueue_capacity = 1");

    let err = a
        .messages
        .enqueue(&mut a.ctx, UnitId(1), MessageClass::Single, &[0; 13], direct(7, 1))
        .unwrap_err();
    assert_eq!(err, EnqueueError::PayloadTooLong { len: 13, max: 12 });

    let two = Destinations::Direct {
        pattern: Pattern(1),
        targets: vec![
            wavemesh_node::Target { did: Did(5), unit: UnitId(1) },
            wavemesh_node::Target { did: Did(7), unit: UnitId(1) },
        ],
    };
    let err = a
        .messages
        .enqueue(&mut a.ctx, UnitId(1), MessageClass::Single, b"x", two)
        .unwrap_err();
    assert_eq!(err, EnqueueError::QueueFull);
    assert!(a.ctx.engine.is_empty());

    let broadcast = Destinations::Broadcast {
        pattern: Pattern(1),
        dst_unit: UnitId(1),
    };
    let err = a
        .messages
        .enqueue(&mut a.ctx, UnitId(1), MessageClass::Block, b"x", broadcast)
        .unwrap_err();
    assert!(matches!(err, EnqueueError::Unsupported(_)));

    let mut fresh = unjoined(&medium, 77);
    let err = fresh
        .messages
        .enqueue(&mut fresh.ctx, UnitId(1), MessageClass::Single, b"x", direct(3, 1))
        .unwrap_err();
    assert_eq!(err, EnqueueError::Config(wavemesh_node::ConfigError::NotJoined));
}

#[test]
fn bad_frames_are_dropped_and_counted() {
    let medium = SimMedium::new();
    let mut a = member(&medium, 3);
    let mut now = Tick::ZERO;
    let id = a.ctx.radio.id();

    let seal = |nid: u16| {
        Frame::seal(
            Pid::new(PacketClass::Single, Encryption::Network),
            Nid(nid),
            Did(5),
            Did(3),
            MessageId(0),
            &[1, 2, 0, 1, 0xAA],
            &a.ctx.keys,
        )
        .unwrap()
        .to_bytes()
    };
    let foreign = seal(0x9999);
    let mut corrupt = seal(0x1234);
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0x01;

    medium.inject(id, vec![0x01, 0x02]);
    medium.inject(id, foreign);
    medium.inject(id, corrupt);
    run(&mut [&mut a], &mut now, 1);

    assert_eq!(a.ctx.stats.frames_received, 3);
    assert_eq!(a.ctx.stats.dropped_foreign, 1);
    assert_eq!(a.ctx.stats.dropped(), 3);
    assert!(a.messages.hooks().delivered.is_empty());
    assert_eq!(a.ctx.stats.transmissions, 0, "dropped frames are never answered");
}
