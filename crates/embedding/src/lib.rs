pub mod provider;
pub mod resilient;
pub mod retry;
pub mod sidecar;

pub use provider::{EmbeddingError, EmbeddingProvider};
pub use resilient::{ResilientProvider, RetryConfig, is_retryable_error, wrap_resilient, wrap_resilient_arc};
pub use retry::{Classification, RetryPolicy, with_retry};
pub use sidecar::{SidecarClient, SidecarConfig, SidecarInfo, SidecarSupervisor};
