mod backend;
mod call_command;
mod call_state;
mod handle;
mod participants;
mod session;
mod state_machine;

pub use backend::*;
pub use call_command::*;
pub use call_state::*;
pub use handle::*;
pub use participants::*;
pub use session::*;
pub use state_machine::*;
