//! Device/network directory.
//!
//! Pure data: known peers and (local unit, pattern) → target assignments,
//! each in a fixed-capacity arena of slots. Mutated only by the message
//! coordinator; no I/O.

use wavemesh_core::{Did, MessageId, Pattern, UnitId};
use wavemesh_protocol::Tick;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("peer table full ({0} entries)")]
    PeersFull(usize),
    #[error("assignment table full ({0} entries)")]
    AssignmentsFull(usize),
    #[error("DID {0} cannot be a peer")]
    InvalidPeer(Did),
}

/// What the directory knows about one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub did: Did,
    /// Reached through relays; frames to it carry a hop count.
    pub multi_hop: bool,
    pub last_seen: Option<Tick>,
    pub last_message_id: Option<MessageId>,
    /// Hops left on the last multi-hop frame from it.
    pub last_hops: Option<u8>,
    next_message_id: MessageId,
}

impl PeerInfo {
    pub fn new(did: Did) -> Self {
        Self {
            did,
            multi_hop: false,
            last_seen: None,
            last_message_id: None,
            last_hops: None,
            next_message_id: MessageId(0),
        }
    }

    #[must_use]
    pub fn with_multi_hop(mut self, multi_hop: bool) -> Self {
        self.multi_hop = multi_hop;
        self
    }
}

/// One remote endpoint a local unit's pattern is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    pub did: Did,
    pub unit: UnitId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub unit: UnitId,
    pub pattern: Pattern,
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone)]
pub struct Directory {
    peers: Vec<Option<PeerInfo>>,
    assignments: Vec<Option<Assignment>>,
    /// Counter for destinations without a peer entry (broadcast, unassigned).
    shared_message_id: MessageId,
}

impl Directory {
    pub fn new(max_peers: usize, max_assignments: usize) -> Self {
        Self {
            peers: vec![None; max_peers],
            assignments: vec![None; max_assignments],
            shared_message_id: MessageId(0),
        }
    }

    pub fn lookup_peer(&self, did: Did) -> Option<&PeerInfo> {
        self.peers.iter().flatten().find(|p| p.did == did)
    }

    fn peer_slot(&self, did: Did) -> Option<usize> {
        self.peers
            .iter()
            .position(|p| p.as_ref().is_some_and(|p| p.did == did))
    }

    /// Insert a peer, or update the routing fields of a known one. The
    /// message counter of a known peer is kept. Returns the slot index.
    pub fn upsert_peer(&mut self, info: PeerInfo) -> Result<usize, DirectoryError> {
        if info.did.is_broadcast() || info.did.is_unassigned() {
            return Err(DirectoryError::InvalidPeer(info.did));
        }
        if let Some(slot) = self.peer_slot(info.did) {
            if let Some(existing) = self.peers[slot].as_mut() {
                existing.multi_hop = info.multi_hop;
                existing.last_seen = info.last_seen.or(existing.last_seen);
                existing.last_message_id = info.last_message_id.or(existing.last_message_id);
                existing.last_hops = info.last_hops.or(existing.last_hops);
            }
            return Ok(slot);
        }
        let slot = self
            .peers
            .iter()
            .position(Option::is_none)
            .ok_or(DirectoryError::PeersFull(self.peers.len()))?;
        self.peers[slot] = Some(info);
        Ok(slot)
    }

    /// Forget a peer and strip it from every assignment.
    pub fn remove_peer(&mut self, did: Did) -> Option<PeerInfo> {
        for assignment in self.assignments.iter_mut().flatten() {
            assignment.targets.retain(|t| t.did != did);
        }
        let slot = self.peer_slot(did)?;
        self.peers[slot].take()
    }

    /// Set the targets of (unit, pattern), replacing any previous list.
    pub fn assign_peer(
        &mut self,
        unit: UnitId,
        pattern: Pattern,
        targets: Vec<Target>,
    ) -> Result<(), DirectoryError> {
        if let Some(existing) = self
            .assignments
            .iter_mut()
            .flatten()
            .find(|a| a.unit == unit && a.pattern == pattern)
        {
            existing.targets = targets;
            return Ok(());
        }
        let slot = self
            .assignments
            .iter()
            .position(Option::is_none)
            .ok_or(DirectoryError::AssignmentsFull(self.assignments.len()))?;
        self.assignments[slot] = Some(Assignment {
            unit,
            pattern,
            targets,
        });
        Ok(())
    }

    pub fn unassign(&mut self, unit: UnitId, pattern: Pattern) -> bool {
        match self
            .assignments
            .iter()
            .position(|a| a.as_ref().is_some_and(|a| a.unit == unit && a.pattern == pattern))
        {
            Some(slot) => {
                self.assignments[slot] = None;
                true
            }
            None => false,
        }
    }

    pub fn targets_for(&self, unit: UnitId, pattern: Pattern) -> &[Target] {
        self.assignments
            .iter()
            .flatten()
            .find(|a| a.unit == unit && a.pattern == pattern)
            .map_or(&[][..], |a| a.targets.as_slice())
    }

    /// Take the next message id for a frame to `peer`.
    pub fn next_message_id(&mut self, peer: Did) -> MessageId {
        let counter = match self.peer_slot(peer) {
            Some(slot) => match self.peers[slot].as_mut() {
                Some(p) => &mut p.next_message_id,
                None => &mut self.shared_message_id,
            },
            None => &mut self.shared_message_id,
        };
        let id = *counter;
        *counter = id.next();
        id
    }

    /// Record a frame from `did`. A hop count marks the sender as multi-hop.
    /// Unknown senders are added while there is room.
    pub fn note_received(&mut self, did: Did, message_id: MessageId, hops: Option<u8>, now: Tick) {
        if did.is_broadcast() || did.is_unassigned() {
            return;
        }
        let slot = match self.peer_slot(did) {
            Some(slot) => slot,
            None => match self.upsert_peer(PeerInfo::new(did)) {
                Ok(slot) => slot,
                Err(_) => return,
            },
        };
        if let Some(peer) = self.peers[slot].as_mut() {
            peer.last_seen = Some(now);
            peer.last_message_id = Some(message_id);
            if hops.is_some() {
                if !peer.multi_hop {
                    tracing::debug!(peer = %did, "directory: learned multi-hop peer");
                }
                peer.multi_hop = true;
                peer.last_hops = hops;
            }
        }
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerInfo> {
        self.peers.iter().flatten()
    }

    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter().flatten()
    }

    pub fn peer_count(&self) -> usize {
        self.peers().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(did: u8, unit: u8) -> Target {
        Target {
            did: Did(did),
            unit: UnitId(unit),
        }
    }

    #[test]
    fn test_upsert_and_lookup() {
        let mut dir = Directory::new(2, 2);
        assert_eq!(dir.upsert_peer(PeerInfo::new(Did(1))), Ok(0));
        assert_eq!(dir.upsert_peer(PeerInfo::new(Did(2)).with_multi_hop(true)), Ok(1));
        assert_eq!(
            dir.upsert_peer(PeerInfo::new(Did(3))),
            Err(DirectoryError::PeersFull(2))
        );
        assert!(dir.lookup_peer(Did(2)).unwrap().multi_hop);
        assert!(dir.lookup_peer(Did(3)).is_none());
    }

    #[test]
    fn test_invalid_peers() {
        let mut dir = Directory::new(2, 2);
        assert!(dir.upsert_peer(PeerInfo::new(Did::BROADCAST)).is_err());
        assert!(dir.upsert_peer(PeerInfo::new(Did::UNASSIGNED)).is_err());
    }

    #[test]
    fn test_upsert_keeps_message_counter() {
        let mut dir = Directory::new(4, 4);
        dir.upsert_peer(PeerInfo::new(Did(1))).unwrap();
        assert_eq!(dir.next_message_id(Did(1)), MessageId(0));
        assert_eq!(dir.next_message_id(Did(1)), MessageId(1));
        dir.upsert_peer(PeerInfo::new(Did(1)).with_multi_hop(true)).unwrap();
        assert_eq!(dir.next_message_id(Did(1)), MessageId(2));
    }

    #[test]
    fn test_message_ids_are_per_peer() {
        let mut dir = Directory::new(4, 4);
        dir.upsert_peer(PeerInfo::new(Did(1))).unwrap();
        dir.upsert_peer(PeerInfo::new(Did(2))).unwrap();
        assert_eq!(dir.next_message_id(Did(1)), MessageId(0));
        assert_eq!(dir.next_message_id(Did(2)), MessageId(0));
        assert_eq!(dir.next_message_id(Did::BROADCAST), MessageId(0));
        assert_eq!(dir.next_message_id(Did::BROADCAST), MessageId(1));
    }

    #[test]
    fn test_assignments() {
        let mut dir = Directory::new(4, 1);
        dir.assign_peer(UnitId(1), Pattern(1), vec![target(2, 1), target(3, 1)])
            .unwrap();
        assert_eq!(dir.targets_for(UnitId(1), Pattern(1)).len(), 2);
        assert!(dir.targets_for(UnitId(1), Pattern(2)).is_empty());

        // Replacing an existing assignment does not need a new slot.
        dir.assign_peer(UnitId(1), Pattern(1), vec![target(4, 2)]).unwrap();
        assert_eq!(dir.targets_for(UnitId(1), Pattern(1)), &[target(4, 2)]);
        assert_eq!(
            dir.assign_peer(UnitId(2), Pattern(1), vec![]),
            Err(DirectoryError::AssignmentsFull(1))
        );

        assert!(dir.unassign(UnitId(1), Pattern(1)));
        assert!(!dir.unassign(UnitId(1), Pattern(1)));
        assert!(dir.assign_peer(UnitId(2), Pattern(1), vec![]).is_ok());
    }

    #[test]
    fn test_remove_peer_strips_assignments() {
        let mut dir = Directory::new(4, 4);
        dir.upsert_peer(PeerInfo::new(Did(2))).unwrap();
        dir.assign_peer(UnitId(1), Pattern(1), vec![target(2, 1), target(3, 1)])
            .unwrap();
        dir.assign_peer(UnitId(2), Pattern(5), vec![target(2, 9)]).unwrap();

        assert_eq!(dir.remove_peer(Did(2)).map(|p| p.did), Some(Did(2)));
        assert_eq!(dir.targets_for(UnitId(1), Pattern(1)), &[target(3, 1)]);
        assert!(dir.targets_for(UnitId(2), Pattern(5)).is_empty());
        assert!(dir.remove_peer(Did(2)).is_none());
    }

    #[test]
    fn test_note_received_learns_multi_hop() {
        let mut dir = Directory::new(4, 4);
        dir.note_received(Did(5), MessageId(3), None, Tick(10));
        let peer = dir.lookup_peer(Did(5)).unwrap();
        assert!(!peer.multi_hop);
        assert_eq!(peer.last_seen, Some(Tick(10)));

        dir.note_received(Did(5), MessageId(4), Some(1), Tick(20));
        let peer = dir.lookup_peer(Did(5)).unwrap();
        assert!(peer.multi_hop);
        assert_eq!(peer.last_hops, Some(1));
        assert_eq!(peer.last_message_id, Some(MessageId(4)));

        dir.note_received(Did::UNASSIGNED, MessageId(0), None, Tick(30));
        assert_eq!(dir.peer_count(), 1);
    }
}
