//! Conversation memory
//!
//! Turn history carried in the session context and the prompt window built from it.

pub mod store;
pub mod window;

pub use store::{Speaker, Turn, TurnHistory, TurnRecord};
pub use window::{HistoryWindow, WindowConfig};
