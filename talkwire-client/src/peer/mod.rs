mod connection_manager;
mod engine_event;
mod managed_connection;
mod media_engine;
mod negotiation;
mod offerer;
mod webrtc_engine;

pub use connection_manager::*;
pub use engine_event::*;
pub use managed_connection::*;
pub use media_engine::*;
pub use negotiation::*;
pub use offerer::*;
pub use webrtc_engine::*;
