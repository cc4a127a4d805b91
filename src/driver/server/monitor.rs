//! 서버 상태 모니터
//!
//! 전용 스레드에서 `heartbeat_frequency`마다 서버에 heartbeat를 보냅니다.
//! 모니터는 풀과 별개의 내부 연결 팩토리를 사용합니다.
//!
//! - 성공: `Connected`, 왕복 시간 갱신. 응답이 역할을 알려 주면 역할도 갱신
//! - 실패: 역할은 두고 `Connecting`으로 전환, 연결돼 있었으면 풀 무효화

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use serde_json::{Map, Value};

use super::ServerState;
use crate::driver::cluster::{ServerConnectionState, ServerDescription, ServerType};
use crate::driver::config::{ServerId, ServerSettings};
use crate::driver::connection::{InternalConnection, InternalConnectionFactory};
use crate::driver::error::DriverResult;
use crate::driver::pool::ConnectionPool;

/// heartbeat 요청 본문
const HEARTBEAT_COMMAND: &[u8] = b"{\"hello\":1}";

/// 왕복 시간 이동 평균 가중치
const RTT_ALPHA: f64 = 0.2;

/// 서버 모니터
pub trait ServerMonitor: Send + Sync {
    /// 모니터 시작 (이미 시작했으면 무시)
    fn start(&self) -> DriverResult<()>;

    /// 다음 주기를 기다리지 않고 확인 요청
    fn request_check(&self);

    /// 모니터 중지
    fn close(&self);
}

/// 서버 모니터 팩토리
pub trait ServerMonitorFactory: Send + Sync {
    /// 주어진 상태를 갱신하는 모니터 생성
    fn create(&self, state: Arc<ServerState>) -> Arc<dyn ServerMonitor>;
}

// ============================================================================
// DefaultServerMonitorFactory
// ============================================================================

/// 기본 모니터 팩토리
pub struct DefaultServerMonitorFactory {
    server_id: ServerId,
    settings: ServerSettings,
    connection_factory: Arc<dyn InternalConnectionFactory>,
    pool: Arc<dyn ConnectionPool>,
}

impl DefaultServerMonitorFactory {
    /// 새 팩토리 생성
    pub fn new(
        server_id: ServerId,
        settings: ServerSettings,
        connection_factory: Arc<dyn InternalConnectionFactory>,
        pool: Arc<dyn ConnectionPool>,
    ) -> Self {
        Self {
            server_id,
            settings,
            connection_factory,
            pool,
        }
    }
}

impl ServerMonitorFactory for DefaultServerMonitorFactory {
    fn create(&self, state: Arc<ServerState>) -> Arc<dyn ServerMonitor> {
        Arc::new(DefaultServerMonitor::new(
            self.server_id.clone(),
            self.settings.clone(),
            self.connection_factory.clone(),
            self.pool.clone(),
            state,
        ))
    }
}

impl std::fmt::Debug for DefaultServerMonitorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultServerMonitorFactory")
            .field("server_id", &self.server_id)
            .field("settings", &self.settings)
            .finish()
    }
}

// ============================================================================
// DefaultServerMonitor
// ============================================================================

#[derive(Default)]
struct Signal {
    shutdown: bool,
    check_requested: bool,
}

struct MonitorInner {
    server_id: ServerId,
    settings: ServerSettings,
    connection_factory: Arc<dyn InternalConnectionFactory>,
    pool: Arc<dyn ConnectionPool>,
    state: Arc<ServerState>,
    connection: Mutex<Option<Box<dyn InternalConnection>>>,
    signal: Mutex<Signal>,
    wake: Condvar,
}

impl MonitorInner {
    fn heartbeat(&self, connection: &mut Option<Box<dyn InternalConnection>>) -> DriverResult<Bytes> {
        let conn = match connection.take() {
            Some(conn) if !conn.is_closed() => conn,
            _ => {
                let mut fresh = self.connection_factory.create(&self.server_id);
                fresh.open()?;
                fresh
            }
        };

        let conn = connection.insert(conn);
        conn.send_message(HEARTBEAT_COMMAND)?;
        conn.receive_message()
    }

    fn check(&self) -> ServerDescription {
        let mut connection = self.connection.lock();
        let started = Instant::now();

        match self.heartbeat(&mut connection) {
            Ok(reply) => {
                let sample = started.elapsed();
                let reported = reported_server_type(&reply);
                self.state.update(|d| {
                    d.state = ServerConnectionState::Connected;
                    d.round_trip_time = average_round_trip(d.round_trip_time, sample);
                    if let Some(server_type) = reported {
                        d.server_type = server_type;
                    }
                });
            }
            Err(e) => {
                if let Some(mut conn) = connection.take() {
                    conn.close();
                }
                drop(connection);

                let was_connected = self.state.description().state == ServerConnectionState::Connected;
                tracing::warn!(server = %self.server_id, "Heartbeat failed: {}", e);
                self.state.update(|d| d.state = ServerConnectionState::Connecting);
                if was_connected {
                    self.pool.invalidate();
                }
            }
        }
        self.state.description()
    }

    fn run(&self) {
        'monitor: loop {
            self.check();

            let now = Instant::now();
            let next_regular = now + self.settings.heartbeat_frequency;
            let earliest = now + self.settings.min_heartbeat_frequency;

            let mut signal = self.signal.lock();
            loop {
                if signal.shutdown {
                    break 'monitor;
                }
                if signal.check_requested && Instant::now() >= earliest {
                    signal.check_requested = false;
                    break;
                }
                let deadline = if signal.check_requested { earliest } else { next_regular };
                if self.wake.wait_until(&mut signal, deadline).timed_out() && !signal.check_requested {
                    break;
                }
            }
        }

        if let Some(mut conn) = self.connection.lock().take() {
            conn.close();
        }
        tracing::debug!(server = %self.server_id, "monitor stopped");
    }
}

/// heartbeat 응답이 알려 주는 역할
///
/// JSON 객체가 아니거나 역할 필드가 없으면 `None` (기존 역할 유지).
fn reported_server_type(reply: &[u8]) -> Option<ServerType> {
    let value: Value = serde_json::from_slice(reply).ok()?;
    let doc = value.as_object()?;

    if doc.get("msg").and_then(Value::as_str) == Some("isdbgrid") {
        return Some(ServerType::ShardRouter);
    }

    let writable = flag(doc, "isWritablePrimary") || flag(doc, "ismaster");
    if doc.contains_key("setName") {
        let server_type = if writable {
            ServerType::ReplicaSetPrimary
        } else if flag(doc, "secondary") {
            ServerType::ReplicaSetSecondary
        } else if flag(doc, "arbiterOnly") {
            ServerType::ReplicaSetArbiter
        } else {
            ServerType::ReplicaSetOther
        };
        return Some(server_type);
    }

    if doc.contains_key("isWritablePrimary") || doc.contains_key("ismaster") {
        return Some(ServerType::Standalone);
    }
    None
}

fn flag(doc: &Map<String, Value>, name: &str) -> bool {
    match doc.get(name) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

fn average_round_trip(previous: Duration, sample: Duration) -> Duration {
    if previous.is_zero() {
        return sample;
    }
    previous.mul_f64(1.0 - RTT_ALPHA) + sample.mul_f64(RTT_ALPHA)
}

/// 기본 서버 모니터 (스레드 기반)
pub struct DefaultServerMonitor {
    inner: Arc<MonitorInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DefaultServerMonitor {
    /// 새 모니터 생성 (시작은 [`start`](ServerMonitor::start))
    pub fn new(
        server_id: ServerId,
        settings: ServerSettings,
        connection_factory: Arc<dyn InternalConnectionFactory>,
        pool: Arc<dyn ConnectionPool>,
        state: Arc<ServerState>,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                server_id,
                settings,
                connection_factory,
                pool,
                state,
                connection: Mutex::new(None),
                signal: Mutex::new(Signal::default()),
                wake: Condvar::new(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// 현재 스레드에서 즉시 확인
    pub fn check_now(&self) -> ServerDescription {
        self.inner.check()
    }

    /// 실행 중인지
    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }
}

impl ServerMonitor for DefaultServerMonitor {
    fn start(&self) -> DriverResult<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() || self.inner.signal.lock().shutdown {
            return Ok(());
        }

        let inner = self.inner.clone();
        let spawned = thread::Builder::new()
            .name(format!("monitor-{}", self.inner.server_id.address))
            .spawn(move || inner.run())?;
        *handle = Some(spawned);

        tracing::debug!(server = %self.inner.server_id, "monitor started");
        Ok(())
    }

    fn request_check(&self) {
        self.inner.signal.lock().check_requested = true;
        self.inner.wake.notify_all();
    }

    fn close(&self) {
        self.inner.signal.lock().shutdown = true;
        self.inner.wake.notify_all();

        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!(server = %self.inner.server_id, "monitor thread panicked");
            }
        }
    }
}

impl Drop for DefaultServerMonitor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DefaultServerMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultServerMonitor")
            .field("server_id", &self.inner.server_id)
            .field("running", &self.is_running())
            .finish()
    }
}
