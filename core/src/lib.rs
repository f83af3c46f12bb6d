//! Shared building blocks for the stereo disparity engine: pixel traits, border handling,
//! local filters, the census transform and thread pool setup.

pub mod border;
pub mod census;
pub mod error;
pub mod filter;
pub mod image;
pub mod runtime;

pub use border::*;
pub use census::{census_transform, CensusVariant, CensusWord};
pub use error::{Error, Result};
pub use image::*;
pub use runtime::{current_cpu_threads, init_global_thread_pool};
