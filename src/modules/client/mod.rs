pub mod container;
pub mod state;

pub use container::{Observer, ObserverId, StateContainer};
pub use state::{reduce, Action, Fetch, SessionState};
