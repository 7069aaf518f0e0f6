//! Newtype wrappers for addressing and radio parameters.
//!
//! Every field that travels in a frame header gets its own type so a device
//! address can never be passed where a network id or message counter is
//! expected.

use core::fmt;

/// Network identifier shared by every device in one mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Nid(pub u16);

impl Nid {
    pub const fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    pub const fn from_be_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }
}

impl fmt::Display for Nid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

/// Device identifier, unique within one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Did(pub u8);

impl Did {
    /// The coordinating device.
    pub const COORDINATOR: Did = Did(0x00);
    /// A device that has not been admitted yet.
    pub const UNASSIGNED: Did = Did(0xFE);
    /// Every device in range.
    pub const BROADCAST: Did = Did(0xFF);
    /// Highest DID the member pool can ever hand out.
    pub const MAX_MEMBER: Did = Did(0xFD);

    pub const fn is_broadcast(self) -> bool {
        self.0 == Self::BROADCAST.0
    }

    pub const fn is_coordinator(self) -> bool {
        self.0 == Self::COORDINATOR.0
    }

    pub const fn is_unassigned(self) -> bool {
        self.0 == Self::UNASSIGNED.0
    }

    /// True for DIDs in the assignable member pool.
    pub const fn is_member(self) -> bool {
        self.0 >= 0x01 && self.0 <= Self::MAX_MEMBER.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

/// Rolling per-peer message counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageId(pub u8);

impl MessageId {
    /// The id after this one, wrapping at 255.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Radio channel index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Channel(pub u8);

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Radio data-rate index. The mapping to an actual bit rate belongs to the
/// radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataRate(pub u8);

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rate{}", self.0)
    }
}

/// A logical endpoint (switch, sensor, lamp) inside one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u8);

/// Application message pattern a unit emits, e.g. "on/off" or "level".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pattern(pub u8);
