//! Shared harness: devices on one simulated medium, stepped 1 ms at a time.
#![allow(dead_code)]

use std::collections::VecDeque;

use wavemesh_core::{Did, NackReason, Pattern, UnitId};
use wavemesh_interfaces::{SimMedium, SimRadio};
use wavemesh_node::driver::Device;
use wavemesh_node::{Destinations, MemoryStore, MessageClass, MessageCoordinator, NodeConfig, Target};
use wavemesh_protocol::{AppHooks, Delivery, NetworkEvent, Outcome, Tick, TransferState, TxId};

pub type SimDevice = Device<SimRadio, MemoryStore, Recorder>;

pub const NETWORK: &str = r#"
[network]
nid = 0x1234
network_key = "00112233445566778899aabbccddeeff"
stream_key = "0f0e0d0c0b0a09080706050403020100"
access_key = "a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5"
"#;

/// Hooks that remember everything and answer from canned values.
#[derive(Debug, Default)]
pub struct Recorder {
    pub delivered: Vec<Delivery>,
    pub outcomes: Vec<Outcome>,
    pub events: Vec<NetworkEvent>,
    pub fatality: Vec<(NackReason, bool)>,
    pub stream: VecDeque<Vec<u8>>,
    pub hops: Option<u8>,
}

impl AppHooks for Recorder {
    fn adjust_nack_fatality(&mut self, reason: NackReason, is_fatal: &mut bool) {
        if let Some((_, fatal)) = self.fatality.iter().find(|(r, _)| *r == reason) {
            *is_fatal = *fatal;
        }
    }

    fn next_block_or_stream_payload(&mut self, _transfer: &TransferState) -> Option<Vec<u8>> {
        self.stream.pop_front()
    }

    fn on_message_delivered(&mut self, delivery: &Delivery) {
        self.delivered.push(delivery.clone());
    }

    fn on_transaction_outcome(&mut self, outcome: &Outcome) {
        self.outcomes.push(outcome.clone());
    }

    fn adjust_hop_count(&mut self, _dst: Did, max_hops: &mut u8) {
        if let Some(hops) = self.hops {
            *max_hops = hops;
        }
    }

    fn on_network_event(&mut self, event: &NetworkEvent) {
        self.events.push(event.clone());
    }
}

pub fn boot(medium: &SimMedium, toml: &str) -> SimDevice {
    wavemesh_node::logging::init_for_tests();
    let config = NodeConfig::parse(toml).unwrap();
    let (ctx, messages) =
        MessageCoordinator::boot(medium.attach(), &config, MemoryStore::new(), Recorder::default())
            .unwrap();
    Device::new(ctx, messages)
}

pub fn coordinator(medium: &SimMedium) -> SimDevice {
    boot(
        medium,
        &format!("[device]\nrole = \"coordinator\"\nserial = 1\n{NETWORK}"),
    )
}

/// A provisioned member. `device` goes into `[device]`, `extra` after the
/// network section.
pub fn member_with(medium: &SimMedium, did: u8, device: &str, extra: &str) -> SimDevice {
    let serial = 1000 + u32::from(did);
    boot(
        medium,
        &format!("[device]\ndid = {did}\nserial = {serial}\n{device}\n{NETWORK}\n{extra}"),
    )
}

pub fn member(medium: &SimMedium, did: u8) -> SimDevice {
    member_with(medium, did, "", "")
}

/// A factory-fresh device that only holds the access key.
pub fn unjoined(medium: &SimMedium, serial: u32) -> SimDevice {
    boot(
        medium,
        &format!(
            "[device]\nserial = {serial}\n[network]\naccess_key = \"a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5\"\n"
        ),
    )
}

/// Advance every device by one millisecond, in order.
pub fn step(devices: &mut [&mut SimDevice], now: &mut Tick) {
    *now = *now + 1;
    for device in devices.iter_mut() {
        device.tick(*now);
    }
}

pub fn run(devices: &mut [&mut SimDevice], now: &mut Tick, ms: u32) {
    for _ in 0..ms {
        step(devices, now);
    }
}

/// Step until `done` holds, for at most `max_ms`. Returns whether it held.
pub fn run_until(
    devices: &mut [&mut SimDevice],
    now: &mut Tick,
    max_ms: u32,
    mut done: impl FnMut(&[&mut SimDevice]) -> bool,
) -> bool {
    for _ in 0..max_ms {
        step(devices, now);
        if done(devices) {
            return true;
        }
    }
    false
}

pub fn direct(did: u8, unit: u8) -> Destinations {
    Destinations::Direct {
        pattern: Pattern(1),
        targets: vec![Target {
            did: Did(did),
            unit: UnitId(unit),
        }],
    }
}

/// Enqueue one message to a single peer and return its handle.
pub fn send(device: &mut SimDevice, class: MessageClass, to: u8, data: &[u8]) -> TxId {
    let handles = device
        .messages
        .enqueue(&mut device.ctx, UnitId(1), class, data, direct(to, 2))
        .unwrap();
    assert_eq!(handles.len(), 1);
    handles[0]
}
