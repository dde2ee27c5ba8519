//! Host-side session: claims the room id, tracks viewers, and broadcasts
//! the screen.
//!
//! Entering a room that the cache still knows resumes it. If the room was
//! streaming before, capture is reacquired as soon as the transport is open
//! and attached to every viewer that reconnects.

mod handlers;
mod manager;
mod types;


pub use manager::HostSession;
