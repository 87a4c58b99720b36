mod event;
mod period;
mod types;

pub use event::*;
pub use period::*;
pub use types::*;
