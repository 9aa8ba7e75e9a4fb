pub mod scripted_poll;
pub mod signal_helpers;

pub use fake_engine::*;
pub use memory_relay::*;
pub use mock_backend::*;
pub use mock_signaling::*;
pub use mock_transport::*;
pub use scripted_poll::*;
pub use signal_helpers::*;
