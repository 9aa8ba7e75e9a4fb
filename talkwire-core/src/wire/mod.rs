//! On-wire framings of the two signaling paths.
//!
//! `internal` is the pull-based framing spoken with the backend's polling
//! endpoint, `relay` is the framing of the persistent relay socket.

pub mod internal;
pub mod relay;
