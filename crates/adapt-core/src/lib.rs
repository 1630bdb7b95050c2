pub mod buckets;
pub mod ci;
pub mod config;
pub mod error;
pub mod events;
pub mod io;
pub mod memory;
pub mod outcome;
pub mod paths;
pub mod pipeline_state;
pub mod predictor;
pub mod recorder;
pub mod report;
pub mod risk;
pub mod router;
pub mod template;
pub mod tune;
pub mod validation;

pub use error::{AdaptError, Result};
