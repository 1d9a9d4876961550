pub mod runner;
pub mod sweep;

pub use runner::*;
pub use sweep::*;
