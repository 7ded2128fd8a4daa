pub mod errors;
pub mod estimator;
pub mod objective;
pub mod params;
pub mod registry;

pub use errors::*;
pub use estimator::*;
pub use objective::*;
pub use params::*;
pub use registry::*;
