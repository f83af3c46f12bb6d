//! Stereo block-matching disparity engine
//!
//! Re-exports the image primitives of [`disparity_core`] and the matchers of
//! [`disparity_stereo`] under one crate.

pub use disparity_core as core;
pub use disparity_stereo as stereo;

pub use disparity_core::{BorderMode, CensusVariant, Error, ImageGray, Result};
pub use disparity_stereo::{
    BlockMatcher, Census, DisparityConfig, DisparityImage, MutualInfo, Ncc, Sad,
    SparseBlockMatcher, SparseMatch, StereoDisparity, StereoMutualInformation,
};

/// Initialize the global Rayon thread pool used by the dense matcher.
///
/// Call this once at application startup. Repeated calls return the first initialization
/// result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `DISPARITY_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<()> {
    disparity_core::init_global_thread_pool(num_threads)
}
