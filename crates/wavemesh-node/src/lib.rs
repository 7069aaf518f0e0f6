//! Device layer for the wavemesh stack.
//!
//! This crate ties the protocol engine to a concrete device: its context and
//! statistics, the peer directory, the member and coordinator roles,
//! persistent settings, configuration, logging and a hosted tokio driver.

pub mod admin;
pub mod config;
pub mod context;
pub mod directory;
pub mod driver;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod settings;

pub use admin::AdminCommand;
pub use config::{DeviceRole, NodeConfig};
pub use context::{DeviceContext, DeviceStats, DropReason};
pub use directory::{Directory, PeerInfo, Target};
pub use driver::{Device, ShutdownHandle};
pub use error::{ConfigError, EnqueueError, NodeError};
pub use messaging::{Destinations, JoinState, MessageClass, MessageCoordinator, Role};
pub use settings::{AdmittedDevice, BaseParams, FileStore, MemoryStore, SettingsStore};
