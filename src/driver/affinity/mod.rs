//! 호출 컨텍스트 친화 캐시
//!
//! 호출 컨텍스트(스레드 또는 명시적 세션)를 키로 하는 프로세스 전역 매핑입니다.
//! 항목은 첫 접근 시 생성되고, 명시적인 teardown으로만 제거됩니다.
//! 각 항목은 소유 컨텍스트만 읽고 쓰므로 잠금은 짧은 맵 조작에만 쓰이며,
//! 서버 선택이나 연결 체크아웃 동안에는 잡지 않습니다.

mod connection_factory;

pub use connection_factory::{ConnectionFactory, ThreadAffinityConnectionFactory, ThreadAffinityServerConnection};

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// ContextId - 호출 컨텍스트
// ============================================================================

/// 호출 컨텍스트 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    /// OS 스레드
    Thread(ThreadId),
    /// 명시적 세션 (비동기 태스크 등 스레드 정체성이 없는 경우)
    Session(u64),
}

impl ContextId {
    /// 현재 스레드
    pub fn current() -> Self {
        Self::Thread(thread::current().id())
    }

    /// 새 세션 컨텍스트 발급
    pub fn new_session() -> Self {
        Self::Session(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// ============================================================================
// AffinityMap - 컨텍스트별 캐시
// ============================================================================

/// 컨텍스트별 캐시
///
/// 컨텍스트마다 `K`로 구분되는 여러 슬롯을 가집니다.
pub struct AffinityMap<K, V> {
    entries: Mutex<HashMap<ContextId, HashMap<K, V>>>,
}

impl<K, V> AffinityMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// 빈 맵 생성
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 캐시된 값 조회
    pub fn get(&self, context: ContextId, key: &K) -> Option<V> {
        self.entries
            .lock()
            .get(&context)
            .and_then(|slots| slots.get(key))
            .cloned()
    }

    /// 캐시된 값을 반환하거나, 없으면 생성해 저장
    ///
    /// 생성 함수는 잠금 밖에서 실행됩니다. 같은 컨텍스트가 그 사이에 값을 넣었다면
    /// 먼저 들어간 값이 유지되고 반환됩니다.
    pub fn get_or_try_insert_with<E>(
        &self,
        context: ContextId,
        key: K,
        create: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(existing) = self.get(context, &key) {
            return Ok(existing);
        }

        let created = create()?;
        let mut entries = self.entries.lock();
        let value = entries
            .entry(context)
            .or_default()
            .entry(key)
            .or_insert(created)
            .clone();
        Ok(value)
    }

    /// 캐시된 값을 반환하거나, 없으면 주어진 값을 저장
    pub fn get_or_insert(&self, context: ContextId, key: K, value: V) -> V {
        self.entries
            .lock()
            .entry(context)
            .or_default()
            .entry(key)
            .or_insert(value)
            .clone()
    }

    /// 특정 슬롯 제거
    pub fn remove(&self, context: ContextId, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let slots = entries.get_mut(&context)?;
        let removed = slots.remove(key);
        if slots.is_empty() {
            entries.remove(&context);
        }
        removed
    }

    /// 컨텍스트의 모든 슬롯 제거
    pub fn remove_context(&self, context: ContextId) -> Vec<V> {
        self.entries
            .lock()
            .remove(&context)
            .map(|slots| slots.into_values().collect())
            .unwrap_or_default()
    }

    /// 컨텍스트의 슬롯 수
    pub fn len_for(&self, context: ContextId) -> usize {
        self.entries.lock().get(&context).map_or(0, HashMap::len)
    }

    /// 항목이 있는 컨텍스트 수
    pub fn context_count(&self) -> usize {
        self.entries.lock().len()
    }
}

impl<K, V> Default for AffinityMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
