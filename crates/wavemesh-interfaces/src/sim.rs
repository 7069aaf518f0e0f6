//! In-memory shared radio medium.
//!
//! Every [`SimRadio`] attached to one [`SimMedium`] hears every other radio
//! on the same channel and data rate unless the link between them has been
//! cut, which is how tests build multi-hop topologies. The medium also
//! injects the faults the engine must survive: a busy channel, failed
//! transmissions and silent loss.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use wavemesh_core::constants::MAX_FRAME_LEN;
use wavemesh_core::{Channel, DataRate};

use crate::error::HalError;
use crate::traits::Radio;

/// Index of a radio on its medium.
pub type EndpointId = usize;

/// One frame put on the air, as recorded by the medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub from: EndpointId,
    pub channel: Channel,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct Endpoint {
    channel: Channel,
    data_rate: DataRate,
    inbox: VecDeque<Vec<u8>>,
    busy_checks: u32,
    failing_transmits: u32,
    dropped_transmits: u32,
}

#[derive(Debug)]
struct MediumState {
    endpoints: Vec<Endpoint>,
    cut: HashSet<(EndpointId, EndpointId)>,
    log: Vec<Transmission>,
    max_frame_len: usize,
}

impl Default for MediumState {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            cut: HashSet::new(),
            log: Vec::new(),
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl MediumState {
    fn linked(&self, a: EndpointId, b: EndpointId) -> bool {
        a != b && !self.cut.contains(&ordered(a, b))
    }
}

fn ordered(a: EndpointId, b: EndpointId) -> (EndpointId, EndpointId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Handle to a shared simulated medium. Clones share the same air.
#[derive(Debug, Clone, Default)]
pub struct SimMedium {
    inner: Arc<Mutex<MediumState>>,
}

impl SimMedium {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MediumState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a new radio on channel 0.
    pub fn attach(&self) -> SimRadio {
        self.attach_on(Channel::default())
    }

    pub fn attach_on(&self, channel: Channel) -> SimRadio {
        let mut state = self.state();
        state.endpoints.push(Endpoint {
            channel,
            ..Endpoint::default()
        });
        SimRadio {
            id: state.endpoints.len() - 1,
            medium: self.clone(),
        }
    }

    /// Cut or restore the (symmetric) link between two radios.
    pub fn set_link(&self, a: EndpointId, b: EndpointId, up: bool) {
        let mut state = self.state();
        if up {
            state.cut.remove(&ordered(a, b));
        } else {
            state.cut.insert(ordered(a, b));
        }
    }

    /// Arrange `ids` in a line: each radio only hears its direct neighbors.
    pub fn chain(&self, ids: &[EndpointId]) {
        for (i, &a) in ids.iter().enumerate() {
            for (j, &b) in ids.iter().enumerate().skip(i + 1) {
                self.set_link(a, b, j == i + 1);
            }
        }
    }

    /// Report the channel busy for the next `checks` idle checks of `id`.
    pub fn set_busy(&self, id: EndpointId, checks: u32) {
        if let Some(ep) = self.state().endpoints.get_mut(id) {
            ep.busy_checks = checks;
        }
    }

    /// Fail the next `count` transmit calls of `id` with a HAL error.
    pub fn fail_transmits(&self, id: EndpointId, count: u32) {
        if let Some(ep) = self.state().endpoints.get_mut(id) {
            ep.failing_transmits = count;
        }
    }

    /// Accept but lose the next `count` frames sent by `id`.
    pub fn drop_transmits(&self, id: EndpointId, count: u32) {
        if let Some(ep) = self.state().endpoints.get_mut(id) {
            ep.dropped_transmits = count;
        }
    }

    /// Place raw bytes directly in a radio's receive queue.
    pub fn inject(&self, id: EndpointId, bytes: Vec<u8>) {
        if let Some(ep) = self.state().endpoints.get_mut(id) {
            ep.inbox.push_back(bytes);
        }
    }

    /// Frames waiting in a radio's receive queue.
    pub fn pending(&self, id: EndpointId) -> usize {
        self.state().endpoints.get(id).map_or(0, |ep| ep.inbox.len())
    }

    /// Everything put on the air so far, in order.
    pub fn transmissions(&self) -> Vec<Transmission> {
        self.state().log.clone()
    }

    pub fn transmissions_from(&self, id: EndpointId) -> Vec<Transmission> {
        self.state()
            .log
            .iter()
            .filter(|t| t.from == id)
            .cloned()
            .collect()
    }

    pub fn clear_log(&self) {
        self.state().log.clear();
    }
}

/// A radio attached to a [`SimMedium`].
#[derive(Debug, Clone)]
pub struct SimRadio {
    id: EndpointId,
    medium: SimMedium,
}

impl SimRadio {
    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn medium(&self) -> &SimMedium {
        &self.medium
    }
}

impl Radio for SimRadio {
    fn channel_is_idle(&self) -> bool {
        let mut state = self.medium.state();
        let Some(ep) = state.endpoints.get_mut(self.id) else {
            return false;
        };
        if ep.busy_checks > 0 {
            ep.busy_checks -= 1;
            tracing::trace!(endpoint = self.id, "sim: channel busy");
            return false;
        }
        true
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), HalError> {
        let mut state = self.medium.state();
        let max = state.max_frame_len;
        let ep = state.endpoints.get_mut(self.id).ok_or(HalError::Detached)?;

        if ep.failing_transmits > 0 {
            ep.failing_transmits -= 1;
            return Err(HalError::TransmitFailed("injected failure".into()));
        }
        if frame.len() > max {
            return Err(HalError::FrameTooLong {
                len: frame.len(),
                max,
            });
        }

        let channel = ep.channel;
        let rate = ep.data_rate;
        let lost = ep.dropped_transmits > 0;
        if lost {
            ep.dropped_transmits -= 1;
        }

        state.log.push(Transmission {
            from: self.id,
            channel,
            bytes: frame.to_vec(),
        });
        tracing::trace!(endpoint = self.id, len = frame.len(), lost, "sim: transmit");
        if lost {
            return Ok(());
        }

        let receivers: Vec<EndpointId> = (0..state.endpoints.len())
            .filter(|&other| {
                state.linked(self.id, other)
                    && state.endpoints[other].channel == channel
                    && state.endpoints[other].data_rate == rate
            })
            .collect();
        for other in receivers {
            state.endpoints[other].inbox.push_back(frame.to_vec());
        }
        Ok(())
    }

    fn try_receive(&mut self) -> Option<Vec<u8>> {
        self.medium
            .state()
            .endpoints
            .get_mut(self.id)
            .and_then(|ep| ep.inbox.pop_front())
    }

    fn set_channel(&mut self, channel: Channel) {
        if let Some(ep) = self.medium.state().endpoints.get_mut(self.id) {
            ep.channel = channel;
        }
    }

    fn set_data_rate(&mut self, rate: DataRate) {
        if let Some(ep) = self.medium.state().endpoints.get_mut(self.id) {
            ep.data_rate = rate;
        }
    }

    fn channel(&self) -> Channel {
        self.medium
            .state()
            .endpoints
            .get(self.id)
            .map(|ep| ep.channel)
            .unwrap_or_default()
    }

    fn data_rate(&self) -> DataRate {
        self.medium
            .state()
            .endpoints
            .get(self.id)
            .map(|ep| ep.data_rate)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_conformance() {
        let medium = SimMedium::new();
        let mut a = medium.attach();
        let mut b = medium.attach();
        testing::assert_radio_conformance(&mut a, &mut b);
    }

    #[test]
    fn test_broadcast_reaches_all_but_sender() {
        let medium = SimMedium::new();
        let mut a = medium.attach();
        let mut b = medium.attach();
        let mut c = medium.attach();

        a.transmit(b"frame").unwrap();
        assert_eq!(b.try_receive().as_deref(), Some(&b"frame"[..]));
        assert_eq!(c.try_receive().as_deref(), Some(&b"frame"[..]));
        assert!(a.try_receive().is_none());
    }

    #[test]
    fn test_chain_topology() {
        let medium = SimMedium::new();
        let mut a = medium.attach();
        let b = medium.attach();
        let c = medium.attach();
        medium.chain(&[a.id(), b.id(), c.id()]);

        a.transmit(b"x").unwrap();
        assert_eq!(medium.pending(b.id()), 1);
        assert_eq!(medium.pending(c.id()), 0);
    }

    #[test]
    fn test_channel_separation() {
        let medium = SimMedium::new();
        let mut a = medium.attach();
        let mut b = medium.attach_on(Channel(2));

        a.transmit(b"x").unwrap();
        assert!(b.try_receive().is_none());

        b.set_channel(Channel(0));
        a.transmit(b"y").unwrap();
        assert_eq!(b.try_receive().as_deref(), Some(&b"y"[..]));
    }

    #[test]
    fn test_data_rate_separation() {
        let medium = SimMedium::new();
        let mut a = medium.attach();
        let b = medium.attach();
        a.set_data_rate(DataRate(1));
        a.transmit(b"x").unwrap();
        assert_eq!(medium.pending(b.id()), 0);
    }

    #[test]
    fn test_injected_faults() {
        let medium = SimMedium::new();
        let mut a = medium.attach();
        let b = medium.attach();

        medium.set_busy(a.id(), 2);
        assert!(!a.channel_is_idle());
        assert!(!a.channel_is_idle());
        assert!(a.channel_is_idle());

        medium.fail_transmits(a.id(), 1);
        assert!(matches!(a.transmit(b"x"), Err(HalError::TransmitFailed(_))));
        assert!(a.transmit(b"x").is_ok());
        assert_eq!(medium.pending(b.id()), 1);

        medium.drop_transmits(a.id(), 1);
        a.transmit(b"lost").unwrap();
        assert_eq!(medium.pending(b.id()), 1);
        assert_eq!(medium.transmissions_from(a.id()).len(), 2);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let medium = SimMedium::new();
        let mut a = medium.attach();
        let err = a.transmit(&vec![0u8; MAX_FRAME_LEN + 1]).unwrap_err();
        assert!(matches!(err, HalError::FrameTooLong { .. }));
    }
}
