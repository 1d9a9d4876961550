pub mod allocation;
pub mod constraints;
pub mod extract;
pub mod heuristics;
pub mod ledger;
pub mod model;
pub mod objective;
pub mod solver;
pub mod variables;

pub use allocation::*;
pub use constraints::*;
pub use extract::*;
pub use heuristics::*;
pub use ledger::*;
pub use model::*;
pub use objective::*;
pub use solver::*;
pub use variables::*;
