//! 컨텍스트별 연결 래퍼 캐시
//!
//! 컨텍스트마다 연결 래퍼를 정확히 하나만 만듭니다. 이미 래퍼가 있으면
//! 새로 전달된 전송 연결, 실행기, 모드는 무시되고 기존 래퍼가 그대로 반환됩니다.
//!
//! 한 컨텍스트가 평생 하나의 전송 연결만 쓴다는 가정입니다. 읽기 소스(서버 A)와
//! 쓰기 소스(서버 B)를 함께 쓰는 컨텍스트는 두 번째 서버에 대해서도 첫 래퍼를 받습니다.
//! 이 동작은 유지되며, 주소가 다를 때 경고 로그만 남깁니다.

use std::sync::{Arc, LazyLock};

use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use super::{AffinityMap, ContextId};
use crate::driver::config::{ClusterConnectionMode, ServerAddress};
use crate::driver::connection::{AsyncConnection, Connection, InternalConnection};
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::executor::ProtocolExecutor;
use crate::driver::pool::PooledConnection;

/// 연결 래퍼 생성 전략
///
/// `*_in` 메서드는 호출 컨텍스트를 명시적으로 받습니다. `create`/`create_async`는
/// 현재 스레드를 컨텍스트로 사용합니다.
pub trait ConnectionFactory: Send + Sync {
    /// 지정 컨텍스트의 동기 연결
    fn create_in(
        &self,
        context: ContextId,
        connection: PooledConnection,
        executor: Arc<dyn ProtocolExecutor>,
        mode: ClusterConnectionMode,
    ) -> Arc<dyn Connection>;

    /// 지정 컨텍스트의 비동기 연결
    fn create_async_in(
        &self,
        context: ContextId,
        connection: PooledConnection,
        executor: Arc<dyn ProtocolExecutor>,
        mode: ClusterConnectionMode,
    ) -> Arc<dyn AsyncConnection>;

    /// 동기 연결 생성
    fn create(
        &self,
        connection: PooledConnection,
        executor: Arc<dyn ProtocolExecutor>,
        mode: ClusterConnectionMode,
    ) -> Arc<dyn Connection> {
        self.create_in(ContextId::current(), connection, executor, mode)
    }

    /// 비동기 연결 생성
    fn create_async(
        &self,
        connection: PooledConnection,
        executor: Arc<dyn ProtocolExecutor>,
        mode: ClusterConnectionMode,
    ) -> Arc<dyn AsyncConnection> {
        self.create_async_in(ContextId::current(), connection, executor, mode)
    }
}

/// 프로세스 전역 래퍼 캐시 (팩토리 인스턴스와 무관)
static CONNECTIONS: LazyLock<AffinityMap<(), Arc<ThreadAffinityServerConnection>>> =
    LazyLock::new(AffinityMap::new);

// ============================================================================
// ThreadAffinityConnectionFactory - 컨텍스트별 연결 팩토리
// ============================================================================

/// 컨텍스트별 연결 팩토리
///
/// 모든 인스턴스가 같은 전역 캐시를 공유합니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadAffinityConnectionFactory;

impl ThreadAffinityConnectionFactory {
    /// 새 팩토리 생성
    pub fn new() -> Self {
        Self
    }

    /// 지정 컨텍스트의 래퍼 반환 (없으면 생성)
    pub fn create_for(
        &self,
        context: ContextId,
        connection: PooledConnection,
        executor: Arc<dyn ProtocolExecutor>,
        mode: ClusterConnectionMode,
    ) -> Arc<ThreadAffinityServerConnection> {
        if let Some(existing) = CONNECTIONS.get(context, &()) {
            if existing.address() != &connection.server_id().address {
                tracing::warn!(
                    ?context,
                    pinned = %existing.address(),
                    requested = %connection.server_id().address,
                    "context already pinned to a connection for another server; reusing it"
                );
            } else {
                tracing::debug!(?context, ignored = connection.id(), "reusing pinned connection");
            }
            // 전달된 연결은 drop되며 풀로 돌아감
            return existing;
        }

        let wrapper = Arc::new(ThreadAffinityServerConnection::new(connection, executor, mode));
        tracing::debug!(?context, connection_id = ?wrapper.connection_id(), "pinned connection to context");
        CONNECTIONS.get_or_insert(context, (), wrapper)
    }

    /// 지정 컨텍스트에 캐시된 래퍼
    pub fn cached(context: ContextId) -> Option<Arc<ThreadAffinityServerConnection>> {
        CONNECTIONS.get(context, &())
    }

    /// 현재 스레드의 래퍼 해제
    pub fn teardown() {
        Self::teardown_context(ContextId::current());
    }

    /// 지정 컨텍스트의 래퍼 해제
    ///
    /// 래퍼의 자원을 반납한 뒤 캐시 항목을 지웁니다. 비어 있어도 안전합니다.
    pub fn teardown_context(context: ContextId) {
        if let Some(wrapper) = CONNECTIONS.remove(context, &()) {
            tracing::debug!(?context, connection_id = ?wrapper.connection_id(), "releasing pinned connection");
            wrapper.release_resources();
        }
    }
}

impl ConnectionFactory for ThreadAffinityConnectionFactory {
    fn create_in(
        &self,
        context: ContextId,
        connection: PooledConnection,
        executor: Arc<dyn ProtocolExecutor>,
        mode: ClusterConnectionMode,
    ) -> Arc<dyn Connection> {
        self.create_for(context, connection, executor, mode)
    }

    fn create_async_in(
        &self,
        context: ContextId,
        connection: PooledConnection,
        executor: Arc<dyn ProtocolExecutor>,
        mode: ClusterConnectionMode,
    ) -> Arc<dyn AsyncConnection> {
        self.create_for(context, connection, executor, mode)
    }
}

// ============================================================================
// ThreadAffinityServerConnection - 컨텍스트에 고정된 연결
// ============================================================================

/// 컨텍스트에 고정된 연결 래퍼
///
/// `retain`/`release`는 아무것도 하지 않습니다. 풀 연결은 teardown 시
/// [`release_resources`](Self::release_resources)로만 반납됩니다.
pub struct ThreadAffinityServerConnection {
    address: ServerAddress,
    mode: ClusterConnectionMode,
    executor: Arc<dyn ProtocolExecutor>,
    wrapped: Mutex<Option<PooledConnection>>,
}

impl ThreadAffinityServerConnection {
    fn new(
        connection: PooledConnection,
        executor: Arc<dyn ProtocolExecutor>,
        mode: ClusterConnectionMode,
    ) -> Self {
        Self {
            address: connection.server_id().address.clone(),
            mode,
            executor,
            wrapped: Mutex::new(Some(connection)),
        }
    }

    /// 서버 주소
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// 감싼 연결 ID
    pub fn connection_id(&self) -> Option<u64> {
        self.wrapped.lock().as_ref().map(|c| c.id())
    }

    /// 자원 반납 여부
    pub fn is_released(&self) -> bool {
        self.wrapped.lock().is_none()
    }

    /// 감싼 연결을 닫고 풀에서 제거
    pub fn release_resources(&self) {
        if let Some(connection) = self.wrapped.lock().take() {
            connection.discard();
        }
    }

    fn exchange(&self, payload: &[u8]) -> DriverResult<Bytes> {
        let mut wrapped = self.wrapped.lock();
        let connection = wrapped.as_mut().ok_or_else(|| {
            DriverError::connection(format!("Connection to {} has been released", self.address))
        })?;
        self.executor.execute(payload, connection)
    }
}

impl Connection for ThreadAffinityServerConnection {
    fn id(&self) -> Option<u64> {
        self.connection_id()
    }

    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn mode(&self) -> ClusterConnectionMode {
        self.mode
    }

    fn send_and_receive(&self, payload: &[u8]) -> DriverResult<Bytes> {
        self.exchange(payload)
    }

    fn retain(&self) {}

    fn release(&self) {}
}

impl AsyncConnection for ThreadAffinityServerConnection {
    fn id(&self) -> Option<u64> {
        self.connection_id()
    }

    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn send_and_receive_async(self: Arc<Self>, payload: Bytes) -> BoxFuture<'static, DriverResult<Bytes>> {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || self.exchange(&payload))
                .await
                .map_err(|e| DriverError::internal(format!("Blocking exchange failed: {}", e)))?
        })
    }

    fn release(&self) {}
}

impl std::fmt::Debug for ThreadAffinityServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadAffinityServerConnection")
            .field("address", &self.address)
            .field("mode", &self.mode)
            .field("connection_id", &self.connection_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::config::{ClusterId, ConnectionPoolSettings, ServerId};
    use crate::driver::connection::InternalStreamConnectionFactory;
    use crate::driver::events::NoOpListener;
    use crate::driver::executor::DefaultProtocolExecutor;
    use crate::driver::pool::{ConnectionPool, DefaultConnectionPool};
    use crate::driver::test_support::{EchoStreamFactory, RecordingListener};

    fn pool_for(host: &str) -> DefaultConnectionPool {
        let factory = Arc::new(InternalStreamConnectionFactory::new(
            Arc::new(EchoStreamFactory::default()),
            vec![],
            Arc::new(NoOpListener),
        ));
        DefaultConnectionPool::new(
            ServerId::new(ClusterId::new(), ServerAddress::new(host, 27017)),
            factory,
            ConnectionPoolSettings::default(),
            Arc::new(NoOpListener),
        )
    }

    fn executor() -> Arc<dyn ProtocolExecutor> {
        Arc::new(DefaultProtocolExecutor::new(Arc::new(NoOpListener)))
    }

    #[test]
    fn test_create_pins_first_wrapper() {
        let ctx = ContextId::new_session();
        let factory = ThreadAffinityConnectionFactory::new();
        let pool = pool_for("a");

        let first_conn = pool.get().unwrap();
        let first_id = first_conn.id();
        let first = factory.create_for(ctx, first_conn, executor(), ClusterConnectionMode::Multiple);

        let second = factory.create_for(
            ctx,
            pool.get().unwrap(),
            executor(),
            ClusterConnectionMode::Single,
        );

        // 두 번째 인자는 무시되고 같은 래퍼가 반환됨
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.connection_id(), Some(first_id));
        assert_eq!(Connection::mode(second.as_ref()), ClusterConnectionMode::Multiple);

        // 무시된 연결은 풀로 돌아감
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.in_use_count(), 1);

        ThreadAffinityConnectionFactory::teardown_context(ctx);
    }

    #[test]
    fn test_create_pins_across_servers() {
        let ctx = ContextId::new_session();
        let factory = ThreadAffinityConnectionFactory::new();
        let pool_a = pool_for("a");
        let pool_b = pool_for("b");

        let first = factory.create_for(ctx, pool_a.get().unwrap(), executor(), ClusterConnectionMode::Multiple);
        let second = factory.create_for(ctx, pool_b.get().unwrap(), executor(), ClusterConnectionMode::Multiple);

        // 다른 서버를 요청해도 첫 래퍼가 유지됨
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.address().host, "a");

        ThreadAffinityConnectionFactory::teardown_context(ctx);
    }

    #[test]
    fn test_trait_create_uses_current_thread() {
        let factory = ThreadAffinityConnectionFactory::new();
        let pool = pool_for("a");

        let first = factory.create(pool.get().unwrap(), executor(), ClusterConnectionMode::Multiple);
        let second = factory.create(pool.get().unwrap(), executor(), ClusterConnectionMode::Multiple);
        assert!(Arc::ptr_eq(&first, &second));

        let other_thread = {
            let pooled = pool.get().unwrap();
            std::thread::spawn(move || {
                let conn = ThreadAffinityConnectionFactory::new().create(
                    pooled,
                    executor(),
                    ClusterConnectionMode::Multiple,
                );
                let id = conn.id();
                ThreadAffinityConnectionFactory::teardown();
                id
            })
            .join()
            .unwrap()
        };
        assert_ne!(other_thread, first.id());

        ThreadAffinityConnectionFactory::teardown();
    }

    #[test]
    fn test_sync_and_async_share_wrapper() {
        let ctx = ContextId::current();
        let factory = ThreadAffinityConnectionFactory::new();
        let pool = pool_for("a");

        let sync_conn = factory.create(pool.get().unwrap(), executor(), ClusterConnectionMode::Multiple);
        let async_conn = factory.create_async(pool.get().unwrap(), executor(), ClusterConnectionMode::Multiple);

        assert_eq!(sync_conn.id(), async_conn.id());
        assert_eq!(ThreadAffinityConnectionFactory::cached(ctx).and_then(|c| c.connection_id()), sync_conn.id());

        ThreadAffinityConnectionFactory::teardown();
    }

    #[test]
    fn test_teardown_releases_wrapper() {
        let ctx = ContextId::new_session();
        let factory = ThreadAffinityConnectionFactory::new();
        let pool = pool_for("a");

        let wrapper = factory.create_for(ctx, pool.get().unwrap(), executor(), ClusterConnectionMode::Multiple);
        assert_eq!(pool.size(), 1);

        ThreadAffinityConnectionFactory::teardown_context(ctx);

        assert!(wrapper.is_released());
        assert!(ThreadAffinityConnectionFactory::cached(ctx).is_none());
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.in_use_count(), 0);
        assert!(matches!(
            Connection::send_and_receive(wrapper.as_ref(), b"x"),
            Err(DriverError::Connection(_))
        ));

        // 새 래퍼가 만들어짐
        let fresh = factory.create_for(ctx, pool.get().unwrap(), executor(), ClusterConnectionMode::Multiple);
        assert!(!Arc::ptr_eq(&wrapper, &fresh));

        ThreadAffinityConnectionFactory::teardown_context(ctx);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let ctx = ContextId::new_session();
        ThreadAffinityConnectionFactory::teardown_context(ctx);
        ThreadAffinityConnectionFactory::teardown_context(ctx);
        assert!(ThreadAffinityConnectionFactory::cached(ctx).is_none());
    }

    #[test]
    fn test_release_is_noop() {
        let ctx = ContextId::new_session();
        let pool = pool_for("a");
        let wrapper = ThreadAffinityConnectionFactory::new().create_for(
            ctx,
            pool.get().unwrap(),
            executor(),
            ClusterConnectionMode::Multiple,
        );

        Connection::retain(wrapper.as_ref());
        Connection::release(wrapper.as_ref());
        assert!(!wrapper.is_released());
        assert_eq!(pool.in_use_count(), 1);

        ThreadAffinityConnectionFactory::teardown_context(ctx);
    }

    #[test]
    fn test_wrapper_send_and_receive() {
        let ctx = ContextId::new_session();
        let listener = Arc::new(RecordingListener::default());
        let pool = pool_for("a");
        let wrapper = ThreadAffinityConnectionFactory::new().create_for(
            ctx,
            pool.get().unwrap(),
            Arc::new(DefaultProtocolExecutor::new(listener.clone())),
            ClusterConnectionMode::Multiple,
        );

        let reply = Connection::send_and_receive(wrapper.as_ref(), b"ping").unwrap();
        assert_eq!(&reply[..], b"ping");
        assert_eq!(listener.count("command_succeeded"), 1);

        ThreadAffinityConnectionFactory::teardown_context(ctx);
    }

    #[tokio::test]
    async fn test_wrapper_send_and_receive_async() {
        let ctx = ContextId::new_session();
        let pool = pool_for("a");
        let wrapper = ThreadAffinityConnectionFactory::new().create_for(
            ctx,
            pool.get().unwrap(),
            executor(),
            ClusterConnectionMode::Multiple,
        );

        let reply = wrapper
            .clone()
            .send_and_receive_async(Bytes::from_static(b"pong"))
            .await
            .unwrap();
        assert_eq!(&reply[..], b"pong");

        ThreadAffinityConnectionFactory::teardown_context(ctx);
        let err = wrapper
            .send_and_receive_async(Bytes::from_static(b"pong"))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Connection(_)));
    }
}
