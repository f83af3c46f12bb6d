use crate::{Error, Result};
use rayon::ThreadPoolBuilder;
use std::env;
use std::sync::OnceLock;

/// Environment variable read when no explicit thread count is given.
pub const CPU_THREADS_ENV: &str = "DISPARITY_CPU_THREADS";

static THREAD_POOL_INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Initialize the global Rayon thread pool used by the row-parallel disparity computation.
///
/// Priority:
/// 1. `num_threads` argument
/// 2. `DISPARITY_CPU_THREADS` environment variable
/// 3. Rayon default
///
/// Repeated calls return the result of the first initialization.
pub fn init_global_thread_pool(num_threads: Option<usize>) -> Result<()> {
    THREAD_POOL_INIT
        .get_or_init(|| {
            let configured_threads = match num_threads {
                Some(n) => Some(n),
                None => parse_cpu_threads(env::var(CPU_THREADS_ENV).ok().as_deref())?,
            };

            let mut builder = ThreadPoolBuilder::new();
            if let Some(n) = configured_threads {
                if n == 0 {
                    return Err(format!("{CPU_THREADS_ENV} must be >= 1"));
                }
                builder = builder.num_threads(n);
            }

            builder.build_global().map_err(|e| e.to_string())
        })
        .clone()
        .map_err(Error::RuntimeError)
}

pub fn current_cpu_threads() -> usize {
    rayon::current_num_threads()
}

fn parse_cpu_threads(raw: Option<&str>) -> std::result::Result<Option<usize>, String> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let parsed: usize = raw
        .trim()
        .parse()
        .map_err(|_| format!("{CPU_THREADS_ENV} must be a positive integer, got '{raw}'"))?;
    if parsed == 0 {
        return Err(format!("{CPU_THREADS_ENV} must be >= 1"));
    }
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_thread_counts() {
        assert_eq!(parse_cpu_threads(None), Ok(None));
        assert_eq!(parse_cpu_threads(Some(" 4 ")), Ok(Some(4)));
        assert!(parse_cpu_threads(Some("0")).is_err());
        assert!(parse_cpu_threads(Some("many")).is_err());
    }

    #[test]
    fn current_threads_is_positive() {
        assert!(current_cpu_threads() >= 1);
    }
}
