//! Connection Pool
//!
//! 서버 하나에 대한 블로킹 연결 풀

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use super::config::{ConnectionPoolSettings, ServerId};
use super::connection::{InternalConnection, InternalConnectionFactory};
use super::error::{DriverError, DriverResult};
use super::events::{ConnectionEvent, ConnectionPoolListener};

// ============================================================================
// ConnectionPool - 풀 트레이트
// ============================================================================

/// 연결 풀
pub trait ConnectionPool: Send + Sync {
    /// 연결 획득 (`max_wait_time`까지 대기)
    fn get(&self) -> DriverResult<PooledConnection>;

    /// 지정 시간까지 대기하며 연결 획득
    fn get_with_timeout(&self, timeout: Duration) -> DriverResult<PooledConnection>;

    /// 최소 크기까지 연결 미리 생성
    fn warmup(&self) -> DriverResult<usize>;

    /// 기존 연결 모두 무효화 (세대 증가)
    fn invalidate(&self);

    /// 풀 닫기
    fn close(&self);

    /// 메트릭 조회
    fn metrics(&self) -> PoolMetrics;
}

// ============================================================================
// PoolMetrics - 풀 메트릭
// ============================================================================

/// 풀 메트릭
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// 현재 크기
    pub size: usize,
    /// 유휴 연결 수
    pub idle: usize,
    /// 사용 중인 연결 수
    pub in_use: usize,
    /// 현재 세대
    pub generation: u64,
    /// 총 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성 횟수
    pub total_created: u64,
    /// 총 닫힌 연결 수
    pub total_closed: u64,
    /// 총 타임아웃 횟수
    pub total_timeouts: u64,
}

// ============================================================================
// PooledConnection - 풀링된 연결
// ============================================================================

struct PoolEntry {
    connection: Box<dyn InternalConnection>,
    generation: u64,
    created_at: Instant,
    last_used: Instant,
}

/// 풀에서 체크아웃된 연결
///
/// drop 시 풀로 반환됩니다. 풀이 이미 사라졌으면 연결을 닫습니다.
pub struct PooledConnection {
    id: u64,
    server_id: ServerId,
    entry: Option<PoolEntry>,
    pool: Weak<PoolInner>,
}

impl PooledConnection {
    fn checked_out(entry: PoolEntry, pool: Weak<PoolInner>) -> Self {
        Self {
            id: entry.connection.id(),
            server_id: entry.connection.server_id().clone(),
            entry: Some(entry),
            pool,
        }
    }

    /// 풀에 속하지 않는 연결로 감싸기
    pub fn detached(connection: Box<dyn InternalConnection>) -> Self {
        let now = Instant::now();
        let entry = PoolEntry {
            connection,
            generation: 0,
            created_at: now,
            last_used: now,
        };
        Self::checked_out(entry, Weak::new())
    }

    /// 생성 시간
    pub fn created_at(&self) -> Option<Instant> {
        self.entry.as_ref().map(|e| e.created_at)
    }

    /// 풀 세대
    pub fn generation(&self) -> Option<u64> {
        self.entry.as_ref().map(|e| e.generation)
    }

    /// 풀로 돌려보내지 않고 닫기
    pub fn discard(mut self) {
        if let Some(entry) = self.entry.take() {
            match self.pool.upgrade() {
                Some(pool) => pool.discard(entry),
                None => close_entry(entry),
            }
        }
    }

    fn entry_mut(&mut self) -> DriverResult<&mut PoolEntry> {
        self.entry
            .as_mut()
            .ok_or_else(|| DriverError::connection("Connection has been returned to the pool"))
    }
}

impl InternalConnection for PooledConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    fn open(&mut self) -> DriverResult<()> {
        self.entry_mut()?.connection.open()
    }

    fn is_opened(&self) -> bool {
        self.entry.as_ref().map_or(false, |e| e.connection.is_opened())
    }

    fn is_closed(&self) -> bool {
        self.entry.as_ref().map_or(true, |e| e.connection.is_closed())
    }

    fn send_message(&mut self, payload: &[u8]) -> DriverResult<()> {
        let entry = self.entry_mut()?;
        entry.last_used = Instant::now();
        entry.connection.send_message(payload)
    }

    fn receive_message(&mut self) -> DriverResult<Bytes> {
        self.entry_mut()?.connection.receive_message()
    }

    fn close(&mut self) {
        if let Some(entry) = self.entry.as_mut() {
            entry.connection.close();
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("server_id", &self.server_id)
            .field("generation", &self.generation())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            match self.pool.upgrade() {
                Some(pool) => pool.check_in(entry),
                None => close_entry(entry),
            }
        }
    }
}

fn close_entry(mut entry: PoolEntry) {
    entry.connection.close();
}

// ============================================================================
// DefaultConnectionPool - 기본 연결 풀
// ============================================================================

struct PoolState {
    idle: VecDeque<PoolEntry>,
    size: usize,
    generation: u64,
    open: bool,
}

struct PoolInner {
    server_id: ServerId,
    settings: ConnectionPoolSettings,
    factory: Arc<dyn InternalConnectionFactory>,
    listener: Arc<dyn ConnectionPoolListener>,
    state: Mutex<PoolState>,
    available: Condvar,
    in_use: AtomicUsize,
    total_acquisitions: AtomicU64,
    total_created: AtomicU64,
    total_closed: AtomicU64,
    total_timeouts: AtomicU64,
}

impl PoolInner {
    fn event(&self, connection_id: u64) -> ConnectionEvent {
        ConnectionEvent {
            server_id: self.server_id.clone(),
            connection_id,
        }
    }

    /// 세대, 수명, 유휴 시간 기준 만료 여부
    fn is_perished(&self, entry: &PoolEntry, generation: u64) -> bool {
        if entry.generation != generation || entry.connection.is_closed() {
            return true;
        }

        let life = self.settings.max_connection_life_time;
        if !life.is_zero() && entry.created_at.elapsed() > life {
            return true;
        }

        let idle = self.settings.max_connection_idle_time;
        !idle.is_zero() && entry.last_used.elapsed() > idle
    }

    fn remove(&self, entry: PoolEntry) {
        let id = entry.connection.id();
        close_entry(entry);
        self.total_closed.fetch_add(1, Ordering::Relaxed);
        self.listener.connection_removed(&self.event(id));
    }

    fn check_out(self: &Arc<Self>, mut entry: PoolEntry) -> PooledConnection {
        entry.last_used = Instant::now();
        self.in_use.fetch_add(1, Ordering::Relaxed);
        self.total_acquisitions.fetch_add(1, Ordering::Relaxed);
        self.listener
            .connection_checked_out(&self.event(entry.connection.id()));
        PooledConnection::checked_out(entry, Arc::downgrade(self))
    }

    fn check_in(&self, mut entry: PoolEntry) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        self.listener
            .connection_checked_in(&self.event(entry.connection.id()));
        entry.last_used = Instant::now();

        let mut state = self.state.lock();
        if !state.open || self.is_perished(&entry, state.generation) {
            state.size -= 1;
            drop(state);
            self.remove(entry);
        } else {
            state.idle.push_back(entry);
            drop(state);
        }
        self.available.notify_one();
    }

    fn discard(&self, entry: PoolEntry) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        self.state.lock().size -= 1;
        self.remove(entry);
        self.available.notify_one();
    }

    /// 새 연결 생성 (크기 슬롯은 이미 예약된 상태)
    fn create_entry(&self, generation: u64) -> DriverResult<PoolEntry> {
        let mut connection = self.factory.create(&self.server_id);
        if let Err(e) = connection.open() {
            self.state.lock().size -= 1;
            self.available.notify_one();
            return Err(e);
        }

        self.total_created.fetch_add(1, Ordering::Relaxed);
        self.listener.connection_added(&self.event(connection.id()));

        let now = Instant::now();
        Ok(PoolEntry {
            connection,
            generation,
            created_at: now,
            last_used: now,
        })
    }
}

/// 기본 연결 풀
///
/// 크기 제한은 `max_size`, 대기는 조건 변수로 `max_wait_time`까지입니다.
pub struct DefaultConnectionPool {
    inner: Arc<PoolInner>,
}

impl DefaultConnectionPool {
    /// 새 연결 풀 생성
    pub fn new(
        server_id: ServerId,
        factory: Arc<dyn InternalConnectionFactory>,
        settings: ConnectionPoolSettings,
        listener: Arc<dyn ConnectionPoolListener>,
    ) -> Self {
        listener.pool_opened(&server_id);
        Self {
            inner: Arc::new(PoolInner {
                server_id,
                settings,
                factory,
                listener,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    size: 0,
                    generation: 0,
                    open: true,
                }),
                available: Condvar::new(),
                in_use: AtomicUsize::new(0),
                total_acquisitions: AtomicU64::new(0),
                total_created: AtomicU64::new(0),
                total_closed: AtomicU64::new(0),
                total_timeouts: AtomicU64::new(0),
            }),
        }
    }

    /// 서버 식별자
    pub fn server_id(&self) -> &ServerId {
        &self.inner.server_id
    }

    /// 풀 설정
    pub fn settings(&self) -> &ConnectionPoolSettings {
        &self.inner.settings
    }

    /// 풀 크기
    pub fn size(&self) -> usize {
        self.inner.state.lock().size
    }

    /// 유휴 연결 수
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// 사용 중인 연결 수
    pub fn in_use_count(&self) -> usize {
        self.inner.in_use.load(Ordering::Relaxed)
    }
}

impl ConnectionPool for DefaultConnectionPool {
    fn get(&self) -> DriverResult<PooledConnection> {
        self.get_with_timeout(self.inner.settings.max_wait_time)
    }

    fn get_with_timeout(&self, timeout: Duration) -> DriverResult<PooledConnection> {
        let inner = &self.inner;
        let deadline = Instant::now() + timeout;
        let mut state = inner.state.lock();

        loop {
            if !state.open {
                return Err(DriverError::pool("Pool is closed"));
            }

            // 먼저 유휴 연결 확인
            while let Some(entry) = state.idle.pop_front() {
                if inner.is_perished(&entry, state.generation) {
                    state.size -= 1;
                    inner.remove(entry);
                    continue;
                }
                drop(state);
                return Ok(inner.check_out(entry));
            }

            // 여유가 있으면 새 연결 생성
            if state.size < inner.settings.max_size {
                state.size += 1;
                let generation = state.generation;
                drop(state);

                let entry = inner.create_entry(generation)?;
                return Ok(inner.check_out(entry));
            }

            if inner.available.wait_until(&mut state, deadline).timed_out() {
                inner.total_timeouts.fetch_add(1, Ordering::Relaxed);
                inner.listener.wait_queue_timed_out(&inner.server_id);
                return Err(DriverError::timeout(format!(
                    "Timed out after {:?} while waiting for a connection to {}",
                    timeout, inner.server_id.address
                )));
            }
        }
    }

    fn warmup(&self) -> DriverResult<usize> {
        let inner = &self.inner;
        let mut created = 0;

        loop {
            let generation = {
                let mut state = inner.state.lock();
                if !state.open {
                    return Err(DriverError::pool("Pool is closed"));
                }
                if state.size >= inner.settings.min_size {
                    return Ok(created);
                }
                state.size += 1;
                state.generation
            };

            match inner.create_entry(generation) {
                Ok(entry) => {
                    inner.state.lock().idle.push_back(entry);
                    inner.available.notify_one();
                    created += 1;
                }
                Err(e) => {
                    // 부분 성공 시 경고만 로그
                    tracing::warn!(server = %inner.server_id, "Warmup connection failed: {}", e);
                    if created == 0 {
                        return Err(e);
                    }
                    return Ok(created);
                }
            }
        }
    }

    fn invalidate(&self) {
        let drained: Vec<PoolEntry> = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            let drained: Vec<PoolEntry> = state.idle.drain(..).collect();
            state.size -= drained.len();
            drained
        };

        tracing::debug!(
            server = %self.inner.server_id,
            closed = drained.len(),
            "pool invalidated"
        );
        for entry in drained {
            self.inner.remove(entry);
        }
        self.inner.available.notify_all();
    }

    fn close(&self) {
        let drained: Vec<PoolEntry> = {
            let mut state = self.inner.state.lock();
            if !state.open {
                return;
            }
            state.open = false;
            let drained: Vec<PoolEntry> = state.idle.drain(..).collect();
            state.size -= drained.len();
            drained
        };

        for entry in drained {
            self.inner.remove(entry);
        }
        self.inner.available.notify_all();
        self.inner.listener.pool_closed(&self.inner.server_id);
    }

    fn metrics(&self) -> PoolMetrics {
        let state = self.inner.state.lock();
        PoolMetrics {
            size: state.size,
            idle: state.idle.len(),
            in_use: self.inner.in_use.load(Ordering::Relaxed),
            generation: state.generation,
            total_acquisitions: self.inner.total_acquisitions.load(Ordering::Relaxed),
            total_created: self.inner.total_created.load(Ordering::Relaxed),
            total_closed: self.inner.total_closed.load(Ordering::Relaxed),
            total_timeouts: self.inner.total_timeouts.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for DefaultConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultConnectionPool")
            .field("server_id", &self.inner.server_id)
            .field("size", &self.size())
            .field("idle", &self.idle_count())
            .field("in_use", &self.in_use_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
