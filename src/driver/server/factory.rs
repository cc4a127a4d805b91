//! 서버 조립 팩토리
//!
//! 주소마다 독립된 서버를 조립합니다. 풀과 모니터는 서로 다른 내부 연결
//! 팩토리를 사용하며, 연결 래퍼 캐시는 서버마다 새로 만듭니다.

use std::sync::Arc;

use super::monitor::DefaultServerMonitorFactory;
use super::{ClusterableServer, DefaultServer};
use crate::driver::affinity::ThreadAffinityConnectionFactory;
use crate::driver::config::{
    ClusterId, ClusterSettings, ConnectionPoolSettings, Credential, ServerAddress, ServerId, ServerSettings,
};
use crate::driver::connection::{InternalStreamConnectionFactory, StreamFactory};
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::events::{CommandListener, ConnectionListener, ConnectionPoolListener, NoOpListener};
use crate::driver::pool::{ConnectionPool, DefaultConnectionPool};

/// 클러스터가 서버를 만들 때 쓰는 팩토리
///
/// 만든 서버의 풀은 이 팩토리의 클러스터 ID로 식별되므로, 클러스터는 자신의
/// ID와 설정을 팩토리에서 가져옵니다.
pub trait ClusterableServerFactory: Send + Sync {
    /// 주소에 대한 서버 생성
    fn create(&self, address: ServerAddress) -> Arc<dyn ClusterableServer>;

    /// 서버 설정
    fn settings(&self) -> &ServerSettings;

    /// 서버가 속한 클러스터 ID
    fn cluster_id(&self) -> &ClusterId;

    /// 클러스터 설정
    fn cluster_settings(&self) -> &ClusterSettings;
}

// ============================================================================
// DefaultClusterableServerFactory
// ============================================================================

/// 기본 서버 조립 팩토리
///
/// 생성 후 설정은 바뀌지 않습니다.
pub struct DefaultClusterableServerFactory {
    cluster_id: ClusterId,
    cluster_settings: ClusterSettings,
    server_settings: ServerSettings,
    pool_settings: ConnectionPoolSettings,
    stream_factory: Arc<dyn StreamFactory>,
    heartbeat_stream_factory: Arc<dyn StreamFactory>,
    credentials: Vec<Credential>,
    connection_listener: Arc<dyn ConnectionListener>,
    pool_listener: Arc<dyn ConnectionPoolListener>,
    command_listener: Arc<dyn CommandListener>,
}

impl DefaultClusterableServerFactory {
    /// 빌더 시작
    pub fn builder() -> DefaultClusterableServerFactoryBuilder {
        DefaultClusterableServerFactoryBuilder::default()
    }

    /// 풀 설정
    pub fn pool_settings(&self) -> &ConnectionPoolSettings {
        &self.pool_settings
    }

    /// 자격 증명
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }
}

impl ClusterableServerFactory for DefaultClusterableServerFactory {
    fn create(&self, address: ServerAddress) -> Arc<dyn ClusterableServer> {
        let server_id = ServerId::new(self.cluster_id.clone(), address.clone());

        let pool: Arc<dyn ConnectionPool> = Arc::new(DefaultConnectionPool::new(
            server_id.clone(),
            Arc::new(InternalStreamConnectionFactory::new(
                self.stream_factory.clone(),
                self.credentials.clone(),
                self.connection_listener.clone(),
            )),
            self.pool_settings.clone(),
            self.pool_listener.clone(),
        ));

        // 모니터는 heartbeat 전용 스트림 팩토리 위의 별도 연결 팩토리를 사용
        let monitor_factory = Arc::new(DefaultServerMonitorFactory::new(
            server_id,
            self.server_settings.clone(),
            Arc::new(InternalStreamConnectionFactory::new(
                self.heartbeat_stream_factory.clone(),
                self.credentials.clone(),
                self.connection_listener.clone(),
            )),
            pool.clone(),
        ));

        tracing::debug!(cluster = %self.cluster_id, %address, "assembling server");

        Arc::new(DefaultServer::new(
            address,
            self.cluster_settings.mode,
            pool,
            Arc::new(ThreadAffinityConnectionFactory::new()),
            monitor_factory,
            self.command_listener.clone(),
        ))
    }

    fn settings(&self) -> &ServerSettings {
        &self.server_settings
    }

    fn cluster_id(&self) -> &ClusterId {
        &self.cluster_id
    }

    fn cluster_settings(&self) -> &ClusterSettings {
        &self.cluster_settings
    }
}

impl std::fmt::Debug for DefaultClusterableServerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultClusterableServerFactory")
            .field("cluster_id", &self.cluster_id)
            .field("cluster_settings", &self.cluster_settings)
            .field("server_settings", &self.server_settings)
            .field("pool_settings", &self.pool_settings)
            .field("credentials", &self.credentials)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// 서버 조립 팩토리 빌더
#[derive(Default)]
pub struct DefaultClusterableServerFactoryBuilder {
    cluster_id: Option<ClusterId>,
    cluster_settings: ClusterSettings,
    server_settings: ServerSettings,
    pool_settings: ConnectionPoolSettings,
    stream_factory: Option<Arc<dyn StreamFactory>>,
    heartbeat_stream_factory: Option<Arc<dyn StreamFactory>>,
    credentials: Vec<Credential>,
    connection_listener: Option<Arc<dyn ConnectionListener>>,
    pool_listener: Option<Arc<dyn ConnectionPoolListener>>,
    command_listener: Option<Arc<dyn CommandListener>>,
}

impl DefaultClusterableServerFactoryBuilder {
    /// 클러스터 ID 설정
    pub fn cluster_id(mut self, cluster_id: ClusterId) -> Self {
        self.cluster_id = Some(cluster_id);
        self
    }

    /// 클러스터 설정
    pub fn cluster_settings(mut self, settings: ClusterSettings) -> Self {
        self.cluster_settings = settings;
        self
    }

    /// 서버 설정
    pub fn server_settings(mut self, settings: ServerSettings) -> Self {
        self.server_settings = settings;
        self
    }

    /// 풀 설정
    pub fn pool_settings(mut self, settings: ConnectionPoolSettings) -> Self {
        self.pool_settings = settings;
        self
    }

    /// 애플리케이션 연결용 스트림 팩토리
    pub fn stream_factory(mut self, factory: Arc<dyn StreamFactory>) -> Self {
        self.stream_factory = Some(factory);
        self
    }

    /// heartbeat용 스트림 팩토리 (기본: 애플리케이션 스트림 팩토리)
    pub fn heartbeat_stream_factory(mut self, factory: Arc<dyn StreamFactory>) -> Self {
        self.heartbeat_stream_factory = Some(factory);
        self
    }

    /// 자격 증명 추가
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credentials.push(credential);
        self
    }

    /// 자격 증명 목록 설정
    pub fn credentials(mut self, credentials: Vec<Credential>) -> Self {
        self.credentials = credentials;
        self
    }

    /// 연결 리스너
    pub fn connection_listener(mut self, listener: Arc<dyn ConnectionListener>) -> Self {
        self.connection_listener = Some(listener);
        self
    }

    /// 풀 리스너
    pub fn pool_listener(mut self, listener: Arc<dyn ConnectionPoolListener>) -> Self {
        self.pool_listener = Some(listener);
        self
    }

    /// 커맨드 리스너
    pub fn command_listener(mut self, listener: Arc<dyn CommandListener>) -> Self {
        self.command_listener = Some(listener);
        self
    }

    /// 팩토리 생성
    pub fn build(self) -> DriverResult<DefaultClusterableServerFactory> {
        let stream_factory = self
            .stream_factory
            .ok_or_else(|| DriverError::configuration("A stream factory is required"))?;

        Ok(DefaultClusterableServerFactory {
            cluster_id: self.cluster_id.unwrap_or_default(),
            cluster_settings: self.cluster_settings,
            server_settings: self.server_settings,
            pool_settings: self.pool_settings,
            heartbeat_stream_factory: self
                .heartbeat_stream_factory
                .unwrap_or_else(|| stream_factory.clone()),
            stream_factory,
            credentials: self.credentials,
            connection_listener: self.connection_listener.unwrap_or_else(|| Arc::new(NoOpListener)),
            pool_listener: self.pool_listener.unwrap_or_else(|| Arc::new(NoOpListener)),
            command_listener: self.command_listener.unwrap_or_else(|| Arc::new(NoOpListener)),
        })
    }
}
