pub mod memory;
pub mod redis;
pub mod store;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;
pub use store::{Store, Ttl};

use std::sync::Arc;

/// Connect the shared store used by lock managers and queues.
pub async fn initialize_store(redis_url: &str) -> kx_common::Result<Arc<dyn Store>> {
    let store = RedisStore::new(redis_url).await?;
    store.ping().await?;

    tracing::info!("Store backend initialized successfully");
    Ok(Arc::new(store))
}
