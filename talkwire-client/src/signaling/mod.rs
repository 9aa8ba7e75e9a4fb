mod router;
mod signaling_output;
mod subscription;

pub use router::*;
pub use signaling_output::*;
pub use subscription::*;
