pub mod document_client;
pub mod kv_store;
pub mod local_store;
pub mod remote_store;
pub mod storage_traits;

pub use document_client::{DocumentClient, HttpDocumentClient, MemoryDocumentClient};
pub use kv_store::{KvStore, MemoryKvStore, SqliteKvStore};
pub use local_store::LocalStore;
pub use remote_store::RemoteStore;
pub use storage_traits::StorageBackend;
