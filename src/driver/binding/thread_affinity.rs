//! 컨텍스트 고정 바인딩
//!
//! 호출 컨텍스트마다 읽기 소스와 쓰기 소스를 하나씩 캐시합니다. 캐시는 첫 요청 시
//! 서버 선택으로 채워지고, [`ThreadAffinityBinding::teardown`] 또는
//! [`BindingScope`] drop으로만 비워집니다. 토폴로지가 바뀌어도 다시 선택하지 않습니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use super::{ClusterBindingConnectionSource, ConnectionSource, ReadBinding, ReferenceCounted, WriteBinding};
use crate::driver::affinity::{AffinityMap, ContextId, ThreadAffinityConnectionFactory};
use crate::driver::cluster::{Cluster, ReadPreference, ReadPreferenceServerSelector, ServerSelector, WritableServerSelector};
use crate::driver::error::{DriverError, DriverResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SourceKind {
    Read,
    Write,
}

/// (바인딩 ID, 종류) 별 소스 캐시
static SOURCES: LazyLock<AffinityMap<(u64, SourceKind), Arc<dyn ConnectionSource>>> =
    LazyLock::new(AffinityMap::new);

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// ThreadAffinityBinding
// ============================================================================

/// 컨텍스트 고정 바인딩
///
/// 여러 스레드가 공유해도 되며, 상태는 컨텍스트마다 분리됩니다.
/// `retain`/`release`는 아무것도 하지 않습니다.
pub struct ThreadAffinityBinding {
    id: u64,
    cluster: Arc<dyn Cluster>,
    read_preference: ReadPreference,
}

impl ThreadAffinityBinding {
    /// 새 바인딩 생성
    pub fn new(cluster: Arc<dyn Cluster>, read_preference: ReadPreference) -> Self {
        Self {
            id: NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed),
            cluster,
            read_preference,
        }
    }

    /// 빌더 시작
    pub fn builder() -> ThreadAffinityBindingBuilder {
        ThreadAffinityBindingBuilder::default()
    }

    /// 클러스터
    pub fn cluster(&self) -> &Arc<dyn Cluster> {
        &self.cluster
    }

    /// 지정 컨텍스트의 읽기 소스
    pub fn read_connection_source_for(&self, context: ContextId) -> DriverResult<Arc<dyn ConnectionSource>> {
        self.source_for(context, SourceKind::Read, || {
            Arc::new(ReadPreferenceServerSelector::new(self.read_preference))
        })
    }

    /// 지정 컨텍스트의 쓰기 소스
    pub fn write_connection_source_for(&self, context: ContextId) -> DriverResult<Arc<dyn ConnectionSource>> {
        self.source_for(context, SourceKind::Write, || Arc::new(WritableServerSelector::new()))
    }

    fn source_for(
        &self,
        context: ContextId,
        kind: SourceKind,
        selector: impl FnOnce() -> Arc<dyn ServerSelector>,
    ) -> DriverResult<Arc<dyn ConnectionSource>> {
        SOURCES.get_or_try_insert_with(context, (self.id, kind), || {
            let selector = selector();
            tracing::debug!(binding = self.id, ?context, ?kind, ?selector, "selecting server for context");
            let source = ClusterBindingConnectionSource::with_context(self.cluster.as_ref(), selector, context)?;
            Ok::<_, DriverError>(Arc::new(source) as Arc<dyn ConnectionSource>)
        })
    }

    /// 현재 스레드의 캐시 해제
    ///
    /// 모든 바인딩의 읽기/쓰기 항목과 이 스레드의 연결 래퍼를 해제합니다.
    /// 아무것도 캐시하지 않은 스레드에서 호출해도 안전합니다.
    pub fn teardown() {
        Self::teardown_context(ContextId::current());
    }

    /// 지정 컨텍스트의 캐시 해제
    pub fn teardown_context(context: ContextId) {
        let released = SOURCES.remove_context(context);
        if !released.is_empty() {
            tracing::debug!(?context, sources = released.len(), "released connection sources");
        }
        drop(released);
        ThreadAffinityConnectionFactory::teardown_context(context);
    }

    /// 현재 스레드용 스코프 (drop 시 teardown)
    pub fn scope(&self) -> BindingScope {
        self.scope_for(ContextId::current())
    }

    /// 지정 컨텍스트용 스코프
    pub fn scope_for(&self, context: ContextId) -> BindingScope {
        BindingScope { context }
    }
}

impl ReferenceCounted for ThreadAffinityBinding {
    fn retain(&self) {}

    fn release(&self) {}
}

impl ReadBinding for ThreadAffinityBinding {
    fn read_preference(&self) -> ReadPreference {
        self.read_preference
    }

    fn read_connection_source(&self) -> DriverResult<Arc<dyn ConnectionSource>> {
        self.read_connection_source_for(ContextId::current())
    }
}

impl WriteBinding for ThreadAffinityBinding {
    fn write_connection_source(&self) -> DriverResult<Arc<dyn ConnectionSource>> {
        self.write_connection_source_for(ContextId::current())
    }
}

impl std::fmt::Debug for ThreadAffinityBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadAffinityBinding")
            .field("id", &self.id)
            .field("read_preference", &self.read_preference)
            .finish()
    }
}

/// 스코프 가드
///
/// drop 시 해당 컨텍스트에 [`ThreadAffinityBinding::teardown_context`]를 호출합니다.
#[derive(Debug)]
#[must_use = "the context is torn down when the scope is dropped"]
pub struct BindingScope {
    context: ContextId,
}

impl BindingScope {
    /// 대상 컨텍스트
    pub fn context(&self) -> ContextId {
        self.context
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        ThreadAffinityBinding::teardown_context(self.context);
    }
}

// ============================================================================
// Builder
// ============================================================================

/// 바인딩 빌더
#[derive(Default)]
pub struct ThreadAffinityBindingBuilder {
    cluster: Option<Arc<dyn Cluster>>,
    read_preference: Option<ReadPreference>,
}

impl ThreadAffinityBindingBuilder {
    /// 클러스터 설정
    pub fn cluster(mut self, cluster: Arc<dyn Cluster>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// 읽기 선호도 설정
    pub fn read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = Some(read_preference);
        self
    }

    /// 바인딩 생성
    pub fn build(self) -> DriverResult<ThreadAffinityBinding> {
        let cluster = self
            .cluster
            .ok_or_else(|| DriverError::configuration("cluster can not be null"))?;
        let read_preference = self
            .read_preference
            .ok_or_else(|| DriverError::configuration("read preference can not be null"))?;
        Ok(ThreadAffinityBinding::new(cluster, read_preference))
    }
}
