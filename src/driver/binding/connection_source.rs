//! 클러스터 선택 기반 커넥션 소스

use std::sync::Arc;

use parking_lot::Mutex;

use super::{ConnectionSource, ReferenceCounted};
use crate::driver::affinity::ContextId;
use crate::driver::cluster::{Cluster, ServerDescription, ServerSelector};
use crate::driver::connection::Connection;
use crate::driver::error::DriverResult;
use crate::driver::server::Server;

/// 생성 시 선택된 서버에 고정된 커넥션 소스
///
/// 서버는 다시 선택하지 않습니다. 연결은 첫 [`connection`](ConnectionSource::connection)
/// 호출 때 한 번 만들어지고 이후 그대로 반환됩니다.
pub struct ClusterBindingConnectionSource {
    server: Arc<dyn Server>,
    selector: Arc<dyn ServerSelector>,
    context: ContextId,
    connection: Mutex<Option<Arc<dyn Connection>>>,
}

impl ClusterBindingConnectionSource {
    /// 현재 스레드용 소스 생성 (즉시 서버 선택)
    pub fn new(cluster: &dyn Cluster, selector: Arc<dyn ServerSelector>) -> DriverResult<Self> {
        Self::with_context(cluster, selector, ContextId::current())
    }

    /// 지정 컨텍스트용 소스 생성
    pub fn with_context(
        cluster: &dyn Cluster,
        selector: Arc<dyn ServerSelector>,
        context: ContextId,
    ) -> DriverResult<Self> {
        let server = cluster.select_server(selector.as_ref())?;
        Ok(Self {
            server,
            selector,
            context,
            connection: Mutex::new(None),
        })
    }

    /// 바인딩된 서버
    pub fn server(&self) -> &Arc<dyn Server> {
        &self.server
    }

    /// 선택에 사용한 선택기
    pub fn selector(&self) -> &Arc<dyn ServerSelector> {
        &self.selector
    }

    /// 소유 컨텍스트
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// 연결이 만들어졌는지
    pub fn has_connection(&self) -> bool {
        self.connection.lock().is_some()
    }
}

impl ConnectionSource for ClusterBindingConnectionSource {
    fn server_description(&self) -> ServerDescription {
        self.server.description()
    }

    fn connection(&self) -> DriverResult<Arc<dyn Connection>> {
        let mut cached = self.connection.lock();
        if let Some(connection) = cached.as_ref() {
            return Ok(connection.clone());
        }

        let connection = self.server.connection_in(self.context)?;
        *cached = Some(connection.clone());
        Ok(connection)
    }
}

impl ReferenceCounted for ClusterBindingConnectionSource {
    fn retain(&self) {}

    fn release(&self) {}
}

impl std::fmt::Debug for ClusterBindingConnectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterBindingConnectionSource")
            .field("address", self.server.address())
            .field("selector", &self.selector)
            .field("context", &self.context)
            .field("connected", &self.has_connection())
            .finish()
    }
}
