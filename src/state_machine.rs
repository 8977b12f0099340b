//! Chat-support console state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! polling results and operator actions are events, backend calls and
//! polling changes are effects executed by the runtime.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::{Effect, Notice};
pub use event::Event;
pub use state::{derive_session_state, ConsoleState, SessionState};
pub use transition::{transition, TransitionError};
