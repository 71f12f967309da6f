pub mod cluster;
pub mod sentinel;
pub mod standalone;

pub use cluster::ClusterRouter;
pub use sentinel::SentinelRouter;
pub use standalone::StandaloneRouter;

use crate::error::Result;
use crate::resp::types::RespValue;

/// Common interface for all Redis topology routers.
///
/// Server error replies come back as `RespValue::Error` values; only
/// transport and topology failures are `Err`.
pub trait Router: Send + Sync {
    /// Execute a single command and return the reply.
    fn execute(
        &self,
        args: &[String],
    ) -> impl std::future::Future<Output = Result<RespValue>> + Send;

    /// Send a batch in one round trip per node and return the replies in
    /// command order.
    fn pipeline(
        &self,
        commands: &[Vec<String>],
    ) -> impl std::future::Future<Output = Result<Vec<RespValue>>> + Send;

    /// Release every pool; later calls fail.
    fn close(&self);

    /// Idle connections across pools.
    fn pool_idle_count(&self) -> usize;

    /// Available connection slots across pools.
    fn pool_available(&self) -> usize;
}
