//! The radio contract the protocol engine drives.

use wavemesh_core::{Channel, DataRate};

use crate::error::HalError;

/// A half-duplex packet radio.
///
/// The engine never blocks on the radio: it asks whether the channel is
/// idle, hands over complete on-air frames, and drains whatever frames the
/// driver has buffered since the last tick. Frames are opaque bytes at this
/// layer; validation happens in the frame parser.
pub trait Radio {
    /// Clear-channel assessment.
    fn channel_is_idle(&self) -> bool;

    /// Put one complete frame on the air.
    fn transmit(&mut self, frame: &[u8]) -> Result<(), HalError>;

    /// Next buffered received frame, if any.
    fn try_receive(&mut self) -> Option<Vec<u8>>;

    fn set_channel(&mut self, channel: Channel);

    fn set_data_rate(&mut self, rate: DataRate);

    fn channel(&self) -> Channel;

    fn data_rate(&self) -> DataRate;
}

impl<R: Radio + ?Sized> Radio for &mut R {
    fn channel_is_idle(&self) -> bool {
        (**self).channel_is_idle()
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), HalError> {
        (**self).transmit(frame)
    }

    fn try_receive(&mut self) -> Option<Vec<u8>> {
        (**self).try_receive()
    }

    fn set_channel(&mut self, channel: Channel) {
        (**self).set_channel(channel);
    }

    fn set_data_rate(&mut self, rate: DataRate) {
        (**self).set_data_rate(rate);
    }

    fn channel(&self) -> Channel {
        (**self).channel()
    }

    fn data_rate(&self) -> DataRate {
        (**self).data_rate()
    }
}
