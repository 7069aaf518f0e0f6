//! Generic conformance assertions for [`Radio`] implementations.
//!
//! These helpers check invariants every driver must satisfy so the engine
//! can rely on them, regardless of the hardware behind it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use wavemesh_interfaces::testing;
//!
//! let (mut a, mut b) = two_radios_in_range();
//! testing::assert_radio_conformance(&mut a, &mut b);
//! ```

use wavemesh_core::Channel;

use crate::traits::Radio;

/// Assert that a freshly attached radio has nothing buffered.
pub fn assert_starts_empty(radio: &mut impl Radio) {
    assert!(
        radio.try_receive().is_none(),
        "a new radio must not have buffered frames"
    );
}

/// Assert that an undisturbed channel reports idle.
pub fn assert_idle_when_quiet(radio: &impl Radio) {
    assert!(radio.channel_is_idle(), "quiet channel should report idle");
}

/// Assert that a transmitted frame arrives intact at a radio in range and
/// is not echoed back to the sender.
pub fn assert_delivers_without_echo(tx: &mut impl Radio, rx: &mut impl Radio) {
    let frame = [0xAA, 0xAA, 0xAA, 0xAA, 0xA6, 0x5A];
    tx.transmit(&frame).expect("transmit in range should succeed");
    assert_eq!(
        rx.try_receive().as_deref(),
        Some(&frame[..]),
        "frame must arrive byte for byte"
    );
    assert!(tx.try_receive().is_none(), "sender must not hear itself");
}

/// Assert that `set_channel` is reflected by `channel`.
pub fn assert_channel_is_reported(radio: &mut impl Radio) {
    let before = radio.channel();
    let next = Channel(before.0.wrapping_add(1));
    radio.set_channel(next);
    assert_eq!(radio.channel(), next, "channel() must reflect set_channel()");
    radio.set_channel(before);
}

/// Run all conformance checks on two radios that are in range of each other
/// on the same channel.
pub fn assert_radio_conformance(a: &mut impl Radio, b: &mut impl Radio) {
    assert_starts_empty(a);
    assert_starts_empty(b);
    assert_idle_when_quiet(a);
    assert_delivers_without_echo(a, b);
    assert_delivers_without_echo(b, a);
    assert_channel_is_reported(a);
}
