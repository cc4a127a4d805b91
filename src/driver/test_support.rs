//! 테스트 지원 (네트워크 없는 스트림, 기록용 리스너)

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use super::cluster::{DefaultCluster, ServerDescription, ServerType};
use super::config::{ClusterSettings, ServerAddress, ServerId};
use super::connection::{encode_frame, Stream, StreamFactory};
use super::error::{DriverError, DriverResult};
use super::events::{
    CommandEvent, CommandListener, ConnectionEvent, ConnectionListener, ConnectionPoolListener,
};
use super::server::{ClusterableServer, ClusterableServerFactory, DefaultClusterableServerFactory};

/// 테스트용 주소 (기본 포트)
pub(crate) fn address(host: &str) -> ServerAddress {
    ServerAddress::new(host, 27017)
}

/// 에코 스트림 위의 서버 팩토리
pub(crate) fn echo_server_factory(settings: &ClusterSettings) -> Arc<dyn ClusterableServerFactory> {
    Arc::new(
        DefaultClusterableServerFactory::builder()
            .cluster_settings(settings.clone())
            .stream_factory(Arc::new(EchoStreamFactory::default()))
            .build()
            .unwrap(),
    )
}

/// 역할이 지정된 에코 클러스터 (`Unknown`은 역할 없이 둠)
pub(crate) fn echo_cluster(nodes: &[(&str, ServerType)], selection_timeout: Duration) -> DefaultCluster {
    let settings = ClusterSettings::builder()
        .hosts(nodes.iter().map(|(host, _)| address(host)).collect())
        .server_selection_timeout(selection_timeout)
        .build()
        .unwrap();
    let factory = echo_server_factory(&settings);
    let cluster = DefaultCluster::new(factory).unwrap();

    for (host, server_type) in nodes {
        if *server_type != ServerType::Unknown {
            if let Some(server) = cluster.server(&address(host)) {
                server.apply_description(ServerDescription::new(address(host), *server_type));
            }
        }
    }
    cluster
}

/// 쓴 바이트를 그대로 돌려주는 스트림 (고정 응답이 있으면 매 메시지마다 그 응답)
pub(crate) struct EchoStream {
    address: ServerAddress,
    buffer: VecDeque<u8>,
    reply: Option<Bytes>,
    closed: bool,
}

impl Read for EchoStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.buffer.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.buffer.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

impl Write for EchoStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        }
        self.buffer.extend(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(reply) = &self.reply {
            self.buffer.clear();
            self.buffer.extend(reply.iter());
        }
        Ok(())
    }
}

impl Stream for EchoStream {
    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// 에코 스트림 팩토리 (실패 전환 가능)
#[derive(Default)]
pub(crate) struct EchoStreamFactory {
    created: AtomicUsize,
    failing: AtomicBool,
    reply: Option<Bytes>,
}

impl EchoStreamFactory {
    /// 모든 메시지에 같은 본문으로 답하는 팩토리
    pub(crate) fn replying(reply: &[u8]) -> Self {
        Self {
            reply: Some(encode_frame(reply).unwrap()),
            ..Self::default()
        }
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl StreamFactory for EchoStreamFactory {
    fn create(&self, address: &ServerAddress) -> DriverResult<Box<dyn Stream>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DriverError::connection(format!("{} is unreachable", address)));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(EchoStream {
            address: address.clone(),
            buffer: VecDeque::new(),
            reply: self.reply.clone(),
            closed: false,
        }))
    }
}

/// 항상 실패하는 스트림 팩토리
pub(crate) struct FailingStreamFactory;

impl StreamFactory for FailingStreamFactory {
    fn create(&self, address: &ServerAddress) -> DriverResult<Box<dyn Stream>> {
        Err(DriverError::connection(format!("Failed to connect to {}", address)))
    }
}

/// 이벤트 이름을 기록하는 리스너
#[derive(Default)]
pub(crate) struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub(crate) fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == name).count()
    }

    fn record(&self, name: &str) {
        self.events.lock().push(name.to_string());
    }
}

impl ConnectionListener for RecordingListener {
    fn connection_opened(&self, _event: &ConnectionEvent) {
        self.record("connection_opened");
    }

    fn connection_closed(&self, _event: &ConnectionEvent) {
        self.record("connection_closed");
    }
}

impl ConnectionPoolListener for RecordingListener {
    fn pool_opened(&self, _server_id: &ServerId) {
        self.record("pool_opened");
    }

    fn pool_closed(&self, _server_id: &ServerId) {
        self.record("pool_closed");
    }

    fn connection_added(&self, _event: &ConnectionEvent) {
        self.record("connection_added");
    }

    fn connection_removed(&self, _event: &ConnectionEvent) {
        self.record("connection_removed");
    }

    fn connection_checked_out(&self, _event: &ConnectionEvent) {
        self.record("connection_checked_out");
    }

    fn connection_checked_in(&self, _event: &ConnectionEvent) {
        self.record("connection_checked_in");
    }

    fn wait_queue_timed_out(&self, _server_id: &ServerId) {
        self.record("wait_queue_timed_out");
    }
}

impl CommandListener for RecordingListener {
    fn command_started(&self, _event: &CommandEvent) {
        self.record("command_started");
    }

    fn command_succeeded(&self, _event: &CommandEvent, _elapsed: Duration) {
        self.record("command_succeeded");
    }

    fn command_failed(&self, _event: &CommandEvent, _elapsed: Duration, _error: &str) {
        self.record("command_failed");
    }
}
