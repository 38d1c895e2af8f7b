pub use glob::glob_match;
pub use pin::try_pin_core;

mod glob;
pub mod logger;
mod pin;
