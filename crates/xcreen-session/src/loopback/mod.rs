//! In-process transport and capture source.
//!
//! Peers on one [`LoopbackNetwork`] reach each other by id the way clients
//! of a signaling server would. Used by the `demo` command and by tests.

mod capture;
mod network;

pub use capture::SyntheticCapture;
pub use network::{LoopbackNetwork, LoopbackPeer};
