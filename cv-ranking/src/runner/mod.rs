//! Run execution: unit scheduling, provider calls and rate limiting

pub mod caller;
pub mod executor;
pub mod rate_limiter;

pub use caller::{CallPolicy, ProviderCaller, RunControl};
pub use executor::{
    ConsoleProgress, Executor, ExecutorConfig, NoOpProgress, ProgressCallback, RunError, RunInput,
};
pub use rate_limiter::RateLimiter;
