mod call;
mod config;
mod error;
mod peer;
mod roster;
mod signaling;
mod transport;

pub use call::*;
pub use config::*;
pub use error::*;
pub use peer::*;
pub use roster::*;
pub use signaling::*;
pub use transport::*;
