//! Cross-cutting HTTP middleware.

pub mod logging;

pub use logging::{handle_panic, request_logging};
