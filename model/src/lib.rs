pub mod codec;
mod error;
mod output;
mod params;

pub use error::ModelErr;
pub use output::{OutputRecord, label};
pub use params::{Param, ParameterSet};

/// The model module's result type.
pub type Result<T> = std::result::Result<T, ModelErr>;
