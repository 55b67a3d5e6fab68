pub mod config;
pub mod error;
pub mod random;
pub mod types;

pub use config::ParleyConfig;
pub use error::{ParleyError, Result};
pub use random::{pick_index, RandomSource, SequenceRandom, ThreadRandom};
pub use types::*;
