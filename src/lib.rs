//! # Affinity Driver
//!
//! Thread-affine connection binding for a clustered database client.
//!
//! A calling context (a thread by default, or an explicit session handle) gets one
//! cached "read" connection source and one cached "write" connection source per
//! binding. Repeated operations from the same context reuse the same server and
//! the same pooled connection instead of re-running server selection and pool
//! checkout.
//!
//! ## Features
//!
//! - **Context pinning** - per-context read/write sources and one connection wrapper per context
//! - **Server selection** - read preferences, writable selection, latency window, blocking wait
//! - **Connection pooling** - bounded blocking pool with generations, lifetime and idle limits
//! - **Health monitoring** - background heartbeat per server on a separate connection factory
//! - **Async variant** - connections usable from Tokio through `spawn_blocking`
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use affinity_driver::{
//!     ClusterId, ClusterSettings, Connection, ConnectionSource, DefaultCluster,
//!     DefaultClusterableServerFactory, ReadBinding, ReadPreference, SocketStreamFactory,
//!     ThreadAffinityBinding, WriteBinding,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = ClusterSettings::builder()
//!         .hosts(vec!["db1:27017".parse()?, "db2:27017".parse()?])
//!         .build()?;
//!
//!     // 클러스터는 팩토리의 ID와 설정을 사용 (풀도 같은 ID로 식별됨)
//!     let factory = DefaultClusterableServerFactory::builder()
//!         .cluster_id(ClusterId::with_description("orders"))
//!         .cluster_settings(settings)
//!         .stream_factory(Arc::new(SocketStreamFactory::new(Duration::from_secs(10))))
//!         .build()?;
//!     let cluster = Arc::new(DefaultCluster::new(Arc::new(factory))?);
//!
//!     let binding = ThreadAffinityBinding::new(cluster, ReadPreference::SecondaryPreferred);
//!
//!     // 스코프가 끝나면 이 스레드의 소스와 연결이 해제됨
//!     let _scope = binding.scope();
//!
//!     let reply = binding.read_connection_source()?.connection()?.send_and_receive(b"find")?;
//!     println!("read {} bytes", reply.len());
//!
//!     let ack = binding.write_connection_source()?.connection()?.send_and_receive(b"insert")?;
//!     println!("wrote, ack {} bytes", ack.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Explicit Contexts
//!
//! Tasks without a stable thread identity use a session context:
//!
//! ```rust,ignore
//! let ctx = ContextId::new_session();
//! let source = binding.read_connection_source_for(ctx)?;
//! // ...
//! ThreadAffinityBinding::teardown_context(ctx);
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - bindings, cluster, servers, pools and transport
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod driver;

// Re-exports for convenience
pub use driver::{
    AsyncConnection, BindingScope, Cluster, ClusterBindingConnectionSource, ClusterConnectionMode, ClusterId,
    ClusterSettings, Connection, ConnectionPoolSettings, ConnectionSource, ContextId, Credential, DefaultCluster,
    DefaultClusterableServerFactory, DriverError, DriverResult, ReadBinding, ReadPreference, ReadWriteBinding,
    ServerAddress, ServerDescription, ServerSettings, SocketStreamFactory, ThreadAffinityBinding,
    ThreadAffinityConnectionFactory, WriteBinding,
};
