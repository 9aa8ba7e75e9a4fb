pub mod model;
pub mod wire;

mod error;

pub use error::WireError;
pub use model::*;
