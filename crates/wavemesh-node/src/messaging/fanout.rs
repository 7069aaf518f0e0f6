//! Destination resolution and hop budgets.

use wavemesh_core::{Did, Pattern, UnitId};
use wavemesh_protocol::AppHooks;

use crate::directory::{Directory, Target};
use crate::error::EnqueueError;

/// Where an enqueued message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destinations {
    /// Every target assigned to (local unit, pattern) in the directory.
    Assigned(Pattern),
    /// An explicit target list.
    Direct { pattern: Pattern, targets: Vec<Target> },
    /// Every device, unacknowledged.
    Broadcast { pattern: Pattern, dst_unit: UnitId },
}

impl Destinations {
    pub fn pattern(&self) -> Pattern {
        match self {
            Destinations::Assigned(pattern) => *pattern,
            Destinations::Direct { pattern, .. } | Destinations::Broadcast { pattern, .. } => {
                *pattern
            }
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Destinations::Broadcast { .. })
    }
}

/// Expand destinations into one target per frame.
pub fn resolve(
    directory: &Directory,
    local_unit: UnitId,
    destinations: &Destinations,
) -> Result<Vec<Target>, EnqueueError> {
    let targets = match destinations {
        Destinations::Assigned(pattern) => directory.targets_for(local_unit, *pattern).to_vec(),
        Destinations::Direct { targets, .. } => targets.clone(),
        Destinations::Broadcast { dst_unit, .. } => vec![Target {
            did: Did::BROADCAST,
            unit: *dst_unit,
        }],
    };
    if targets.is_empty() {
        return Err(EnqueueError::NoTargets);
    }
    Ok(targets)
}

/// Hops a frame to `dst` may take. Peers known to be multi-hop start from
/// `max_hops`, everyone else from zero; the application has the last word.
pub fn hop_budget<H: AppHooks + ?Sized>(
    directory: &Directory,
    hooks: &mut H,
    dst: Did,
    max_hops: u8,
) -> u8 {
    let mut hops = match directory.lookup_peer(dst) {
        Some(peer) if peer.multi_hop => max_hops,
        _ => 0,
    };
    hooks.adjust_hop_count(dst, &mut hops);
    hops
}
