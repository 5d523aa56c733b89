//! Client side of the memcached cluster: routing, pooling, and the wire client

pub mod client;
pub mod pool;
pub mod router;

pub use pool::{ConnectionPool, PooledConnection};
pub use router::ShardRouter;
