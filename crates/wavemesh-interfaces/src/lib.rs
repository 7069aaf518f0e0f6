//! Radio HAL contract for the wavemesh stack.
//!
//! The engine drives a [`Radio`]; this crate defines that contract, its
//! error type, and a simulated shared medium used to run many devices in one
//! process.

pub mod error;
pub mod sim;
pub mod testing;
pub mod traits;

pub use error::HalError;
pub use sim::{EndpointId, SimMedium, SimRadio, Transmission};
pub use traits::Radio;
