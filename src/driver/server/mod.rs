//! Server Module
//!
//! 서버 하나에 대한 조립 단위: 연결 풀, 상태 모니터, 연결 래퍼 캐시, 커맨드 리스너.
//!
//! - [`Server`]: 바인딩과 커넥션 소스가 사용하는 읽기 전용 인터페이스
//! - [`ClusterableServer`]: 클러스터가 관리하는 생명주기 인터페이스
//! - [`DefaultClusterableServerFactory`]: 주소별 서버 조립

mod factory;
mod monitor;
mod server;

pub use factory::{
    ClusterableServerFactory, DefaultClusterableServerFactory, DefaultClusterableServerFactoryBuilder,
};
pub use monitor::{DefaultServerMonitor, DefaultServerMonitorFactory, ServerMonitor, ServerMonitorFactory};
pub use server::DefaultServer;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::affinity::ContextId;
use super::cluster::ServerDescription;
use super::config::ServerAddress;
use super::connection::{AsyncConnection, Connection};
use super::error::DriverResult;
use super::pool::PoolMetrics;

/// 서버 설명 변경 리스너
pub type ServerChangeListener = Arc<dyn Fn(&ServerDescription) + Send + Sync>;

// ============================================================================
// Server - 서버 트레이트
// ============================================================================

/// 서버
pub trait Server: Send + Sync {
    /// 서버 주소
    fn address(&self) -> &ServerAddress;

    /// 현재 상태 스냅샷 (블로킹 없음)
    fn description(&self) -> ServerDescription;

    /// 지정 컨텍스트용 연결
    fn connection_in(&self, context: ContextId) -> DriverResult<Arc<dyn Connection>>;

    /// 지정 컨텍스트용 비동기 연결
    fn async_connection_in(&self, context: ContextId) -> DriverResult<Arc<dyn AsyncConnection>>;

    /// 현재 스레드용 연결
    fn connection(&self) -> DriverResult<Arc<dyn Connection>> {
        self.connection_in(ContextId::current())
    }

    /// 현재 스레드용 비동기 연결
    fn async_connection(&self) -> DriverResult<Arc<dyn AsyncConnection>> {
        self.async_connection_in(ContextId::current())
    }
}

/// 클러스터가 관리하는 서버
pub trait ClusterableServer: Server {
    /// 모니터 시작
    fn connect(&self) -> DriverResult<()>;

    /// 풀 무효화 후 즉시 상태 확인 요청
    fn invalidate(&self);

    /// 서버 닫기
    fn close(&self);

    /// 닫힘 여부
    fn is_closed(&self) -> bool;

    /// 외부 토폴로지 정보 반영
    fn apply_description(&self, description: ServerDescription);

    /// 설명 변경 리스너 등록
    fn add_change_listener(&self, listener: ServerChangeListener);

    /// 풀 메트릭
    fn pool_metrics(&self) -> PoolMetrics;

    /// [`Server`] 핸들로 변환
    fn into_server(self: Arc<Self>) -> Arc<dyn Server>;
}

// ============================================================================
// ServerState - 서버와 모니터가 공유하는 상태
// ============================================================================

/// 서버 설명 보관소
///
/// 서버와 모니터가 공유합니다. 설명이 바뀌면 잠금 밖에서 리스너를 호출합니다.
pub struct ServerState {
    description: RwLock<ServerDescription>,
    listeners: Mutex<Vec<ServerChangeListener>>,
}

impl ServerState {
    /// 알 수 없는 상태로 시작
    pub fn new(address: ServerAddress) -> Self {
        Self {
            description: RwLock::new(ServerDescription::unknown(address)),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// 현재 설명
    pub fn description(&self) -> ServerDescription {
        self.description.read().clone()
    }

    /// 설명 교체
    pub fn replace(&self, description: ServerDescription) {
        self.update(|current| *current = description);
    }

    /// 설명 수정 (바뀐 경우에만 알림)
    pub fn update(&self, apply: impl FnOnce(&mut ServerDescription)) {
        let changed = {
            let mut current = self.description.write();
            let before = current.clone();
            apply(&mut current);
            (*current != before).then(|| current.clone())
        };

        if let Some(description) = changed {
            tracing::debug!(
                address = %description.address,
                server_type = ?description.server_type,
                state = ?description.state,
                "server description changed"
            );
            let listeners = self.listeners.lock().clone();
            for listener in listeners {
                listener(&description);
            }
        }
    }

    /// 리스너 등록
    pub fn add_listener(&self, listener: ServerChangeListener) {
        self.listeners.lock().push(listener);
    }
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("description", &*self.description.read())
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}
