pub mod analyzer;
pub mod bootstrap;
pub mod collector;
pub mod dotenv;
pub mod etl;
pub mod live;
pub mod metrics;

pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;
