pub mod community;
pub mod period;
pub mod policy;
pub mod unit;

pub use community::*;
pub use period::*;
pub use policy::*;
pub use unit::*;
