pub mod error;
pub mod hash;
pub mod retry;
pub mod scheduled_executor;

pub use error::{ApiError, ApiResult};
pub use hash::{normalize_query, sha256_hex, short_hash};
pub use retry::{RetryClass, retry_once};
pub use scheduled_executor::{PeriodicTask, ScheduledExecutor, ShutdownHandle};
