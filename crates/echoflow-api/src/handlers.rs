//! Request handlers.

pub mod health;
pub mod receive;

pub use health::*;
pub use receive::*;
