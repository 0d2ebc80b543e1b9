//! CLI command implementations.

pub mod cost;
pub mod order;
pub mod run;
pub mod session;

pub use cost::print_cost;
pub use order::print_order;
pub use run::run_world;
pub use session::Overrides;
