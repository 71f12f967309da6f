pub mod pool;
pub mod tcp;
#[cfg(feature = "tls")]
pub mod tls;

pub use pool::{ConnectionPool, PoolGuard};
pub use tcp::RedisConnection;
