//! Driver Module
//!
//! 컨텍스트 고정 연결 바인딩과 이를 받치는 클러스터/서버/풀 계층.
//!
//! # Layers
//!
//! - binding: 컨텍스트별 읽기/쓰기 커넥션 소스 캐시 (`ThreadAffinityBinding`)
//! - affinity: 컨텍스트 식별자와 컨텍스트별 연결 래퍼 캐시
//! - cluster: 상태 스냅샷, 서버 선택기, 서버 선택 (`DefaultCluster`)
//! - server: 서버 조립 (풀 + 모니터 + 래퍼 캐시 + 커맨드 리스너)
//! - pool / connection / executor: 블로킹 연결 풀, 프레이밍된 스트림 연결, 요청 실행
//!
//! # Example
//!
//! ```ignore
//! use affinity_driver::driver::binding::{ReadBinding, ThreadAffinityBinding};
//! use affinity_driver::driver::cluster::ReadPreference;
//!
//! let binding = ThreadAffinityBinding::new(cluster, ReadPreference::SecondaryPreferred);
//!
//! // 같은 스레드의 두 번째 호출은 서버 선택 없이 같은 소스를 반환
//! let source = binding.read_connection_source()?;
//! assert!(Arc::ptr_eq(&source, &binding.read_connection_source()?));
//!
//! // 스레드 종료 전 해제
//! ThreadAffinityBinding::teardown();
//! ```

pub mod affinity;
pub mod binding;
pub mod cluster;
pub mod server;
mod config;
mod connection;
mod error;
mod events;
mod executor;
mod pool;

#[cfg(test)]
mod test_support;

// Re-exports
pub use affinity::{
    AffinityMap, ConnectionFactory, ContextId, ThreadAffinityConnectionFactory, ThreadAffinityServerConnection,
};
pub use binding::{
    BindingScope, ClusterBindingConnectionSource, ConnectionSource, ReadBinding, ReadWriteBinding,
    ReferenceCounted, ThreadAffinityBinding, ThreadAffinityBindingBuilder, WriteBinding,
};
pub use cluster::{
    Cluster, ClusterDescription, CompositeServerSelector, DefaultCluster, LatencyMinimizingServerSelector,
    ReadPreference, ReadPreferenceServerSelector, ServerConnectionState, ServerDescription, ServerSelector,
    ServerType, WritableServerSelector,
};
pub use config::{
    ClusterConnectionMode, ClusterId, ClusterSettings, ClusterSettingsBuilder, ConnectionPoolSettings,
    ConnectionPoolSettingsBuilder, Credential, ServerAddress, ServerId, ServerSettings, ServerSettingsBuilder,
    DEFAULT_PORT,
};
pub use connection::{
    encode_frame, AsyncConnection, Connection, InternalConnection, InternalConnectionFactory,
    InternalStreamConnection, InternalStreamConnectionFactory, SocketStreamFactory, Stream, StreamFactory,
    FRAME_HEADER_SIZE, MAX_MESSAGE_SIZE,
};
pub use error::{DriverError, DriverResult};
pub use events::{
    CommandEvent, CommandListener, ConnectionEvent, ConnectionListener, ConnectionPoolListener, NoOpListener,
};
pub use executor::{DefaultProtocolExecutor, ProtocolExecutor};
pub use pool::{ConnectionPool, DefaultConnectionPool, PoolMetrics, PooledConnection};
pub use server::{
    ClusterableServer, ClusterableServerFactory, DefaultClusterableServerFactory,
    DefaultClusterableServerFactoryBuilder, DefaultServer, DefaultServerMonitor, DefaultServerMonitorFactory,
    Server, ServerChangeListener, ServerMonitor, ServerMonitorFactory, ServerState,
};
