//! 기본 서버 구현

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::monitor::{ServerMonitor, ServerMonitorFactory};
use super::{ClusterableServer, Server, ServerChangeListener, ServerState};
use crate::driver::affinity::{ConnectionFactory, ContextId};
use crate::driver::cluster::{ServerConnectionState, ServerDescription};
use crate::driver::config::{ClusterConnectionMode, ServerAddress};
use crate::driver::connection::{AsyncConnection, Connection};
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::events::CommandListener;
use crate::driver::executor::{DefaultProtocolExecutor, ProtocolExecutor};
use crate::driver::pool::{ConnectionPool, PoolMetrics, PooledConnection};

/// 기본 서버
///
/// 풀에서 연결을 체크아웃한 뒤 연결 팩토리로 감싸서 돌려줍니다.
/// 상태는 모니터와 [`apply_description`](ClusterableServer::apply_description)으로 갱신됩니다.
pub struct DefaultServer {
    address: ServerAddress,
    mode: ClusterConnectionMode,
    pool: Arc<dyn ConnectionPool>,
    connection_factory: Arc<dyn ConnectionFactory>,
    executor: Arc<dyn ProtocolExecutor>,
    state: Arc<ServerState>,
    monitor: Arc<dyn ServerMonitor>,
    closed: AtomicBool,
}

impl DefaultServer {
    /// 새 서버 생성
    pub fn new(
        address: ServerAddress,
        mode: ClusterConnectionMode,
        pool: Arc<dyn ConnectionPool>,
        connection_factory: Arc<dyn ConnectionFactory>,
        monitor_factory: Arc<dyn ServerMonitorFactory>,
        command_listener: Arc<dyn CommandListener>,
    ) -> Self {
        let state = Arc::new(ServerState::new(address.clone()));
        let monitor = monitor_factory.create(state.clone());
        Self {
            address,
            mode,
            pool,
            connection_factory,
            executor: Arc::new(DefaultProtocolExecutor::new(command_listener)),
            state,
            monitor,
            closed: AtomicBool::new(false),
        }
    }

    /// 클러스터 연결 모드
    pub fn mode(&self) -> ClusterConnectionMode {
        self.mode
    }

    /// 연결 풀
    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    fn checkout(&self) -> DriverResult<PooledConnection> {
        if self.is_closed() {
            return Err(DriverError::pool(format!("Server {} is closed", self.address)));
        }

        self.pool.get().map_err(|e| {
            // 전송 계층 실패면 풀을 비우고 즉시 재확인
            if matches!(e, DriverError::Connection(_) | DriverError::Io(_)) {
                tracing::debug!(address = %self.address, "checkout failed, invalidating server: {}", e);
                ClusterableServer::invalidate(self);
            }
            e
        })
    }
}

impl Server for DefaultServer {
    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn description(&self) -> ServerDescription {
        self.state.description()
    }

    fn connection_in(&self, context: ContextId) -> DriverResult<Arc<dyn Connection>> {
        let pooled = self.checkout()?;
        Ok(self
            .connection_factory
            .create_in(context, pooled, self.executor.clone(), self.mode))
    }

    fn async_connection_in(&self, context: ContextId) -> DriverResult<Arc<dyn AsyncConnection>> {
        let pooled = self.checkout()?;
        Ok(self
            .connection_factory
            .create_async_in(context, pooled, self.executor.clone(), self.mode))
    }
}

impl ClusterableServer for DefaultServer {
    fn connect(&self) -> DriverResult<()> {
        self.monitor.start()?;
        if let Err(e) = self.pool.warmup() {
            tracing::warn!(address = %self.address, "Pool warmup failed: {}", e);
        }
        Ok(())
    }

    fn invalidate(&self) {
        if self.is_closed() {
            return;
        }
        // 역할은 다음 heartbeat까지 유지
        self.state.update(|d| d.state = ServerConnectionState::Connecting);
        self.pool.invalidate();
        self.monitor.request_check();
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.monitor.close();
        self.pool.close();
        tracing::debug!(address = %self.address, "server closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn apply_description(&self, description: ServerDescription) {
        self.state.replace(description);
    }

    fn add_change_listener(&self, listener: ServerChangeListener) {
        self.state.add_listener(listener);
    }

    fn pool_metrics(&self) -> PoolMetrics {
        self.pool.metrics()
    }

    fn into_server(self: Arc<Self>) -> Arc<dyn Server> {
        self
    }
}

impl std::fmt::Debug for DefaultServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultServer")
            .field("address", &self.address)
            .field("mode", &self.mode)
            .field("description", &self.state.description())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::affinity::ThreadAffinityConnectionFactory;
    use crate::driver::cluster::ServerType;
    use crate::driver::config::{ClusterId, ConnectionPoolSettings, ServerId, ServerSettings};
    use crate::driver::connection::InternalStreamConnectionFactory;
    use crate::driver::events::NoOpListener;
    use crate::driver::pool::DefaultConnectionPool;
    use crate::driver::server::DefaultServerMonitorFactory;
    use crate::driver::test_support::{EchoStreamFactory, RecordingListener};

    fn create_server(
        streams: Arc<EchoStreamFactory>,
        listener: Arc<RecordingListener>,
    ) -> Arc<DefaultServer> {
        let address = ServerAddress::new("server", 27017);
        let server_id = ServerId::new(ClusterId::new(), address.clone());
        let connections = Arc::new(InternalStreamConnectionFactory::new(
            streams.clone(),
            vec![],
            Arc::new(NoOpListener),
        ));
        let pool: Arc<dyn ConnectionPool> = Arc::new(DefaultConnectionPool::new(
            server_id.clone(),
            connections.clone(),
            ConnectionPoolSettings::default(),
            Arc::new(NoOpListener),
        ));
        let monitors = Arc::new(DefaultServerMonitorFactory::new(
            server_id,
            ServerSettings::default(),
            connections,
            pool.clone(),
        ));
        Arc::new(DefaultServer::new(
            address,
            ClusterConnectionMode::Multiple,
            pool,
            Arc::new(ThreadAffinityConnectionFactory::new()),
            monitors,
            listener,
        ))
    }

    #[test]
    fn test_connection_is_pinned_per_context() {
        let server = create_server(Arc::new(EchoStreamFactory::default()), Arc::new(RecordingListener::default()));
        let ctx = ContextId::new_session();

        let first = server.connection_in(ctx).unwrap();
        let second = server.connection_in(ctx).unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(first.address(), server.address());
        assert_eq!(first.mode(), ClusterConnectionMode::Multiple);

        // 두 번째 체크아웃은 풀로 돌아감
        let metrics = server.pool_metrics();
        assert_eq!(metrics.in_use, 1);
        assert_eq!(metrics.idle, 1);

        ThreadAffinityConnectionFactory::teardown_context(ctx);
        assert_eq!(server.pool_metrics().in_use, 0);
    }

    #[test]
    fn test_connection_emits_command_events() {
        let listener = Arc::new(RecordingListener::default());
        let server = create_server(Arc::new(EchoStreamFactory::default()), listener.clone());
        let ctx = ContextId::new_session();

        let conn = server.connection_in(ctx).unwrap();
        assert_eq!(&conn.send_and_receive(b"ping").unwrap()[..], b"ping");
        assert_eq!(listener.events(), vec!["command_started", "command_succeeded"]);

        ThreadAffinityConnectionFactory::teardown_context(ctx);
    }

    #[test]
    fn test_apply_description_notifies() {
        let server = create_server(Arc::new(EchoStreamFactory::default()), Arc::new(RecordingListener::default()));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            server.add_change_listener(Arc::new(move |d: &ServerDescription| seen.lock().push(d.server_type)));
        }

        server.apply_description(ServerDescription::new(server.address().clone(), ServerType::ReplicaSetPrimary));
        assert!(server.description().is_primary());
        assert_eq!(*seen.lock(), vec![ServerType::ReplicaSetPrimary]);
    }

    #[test]
    fn test_checkout_failure_invalidates() {
        let streams = Arc::new(EchoStreamFactory::default());
        let server = create_server(streams.clone(), Arc::new(RecordingListener::default()));
        server.apply_description(ServerDescription::new(server.address().clone(), ServerType::Standalone));

        streams.set_failing(true);
        let err = server.connection_in(ContextId::new_session()).err().unwrap();
        assert!(matches!(err, DriverError::Connection(_)));
        let description = server.description();
        assert!(!description.is_ok());
        assert_eq!(description.state, ServerConnectionState::Connecting);
        assert_eq!(description.server_type, ServerType::Standalone);
        assert_eq!(server.pool_metrics().generation, 1);
    }

    #[test]
    fn test_closed_server_rejects_connections() {
        let server = create_server(Arc::new(EchoStreamFactory::default()), Arc::new(RecordingListener::default()));
        server.connect().unwrap();
        server.close();
        server.close();

        assert!(server.is_closed());
        assert!(matches!(
            server.connection_in(ContextId::new_session()),
            Err(DriverError::Pool(_))
        ));
    }

    #[tokio::test]
    async fn test_async_connection() {
        let server = create_server(Arc::new(EchoStreamFactory::default()), Arc::new(RecordingListener::default()));
        let ctx = ContextId::new_session();

        let conn = server.async_connection_in(ctx).unwrap();
        let reply = conn
            .send_and_receive_async(bytes::Bytes::from_static(b"async"))
            .await
            .unwrap();
        assert_eq!(&reply[..], b"async");

        ThreadAffinityConnectionFactory::teardown_context(ctx);
    }
}
