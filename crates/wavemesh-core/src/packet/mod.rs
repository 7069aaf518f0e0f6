pub mod ack;
pub mod frame;
pub mod pid;

pub use ack::{AckDescriptor, NackReason};
pub use frame::Frame;
pub use pid::Pid;
