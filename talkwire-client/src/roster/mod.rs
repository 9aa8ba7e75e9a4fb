mod call_roster;
mod delta;

pub use call_roster::*;
pub use delta::*;
