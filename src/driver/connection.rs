//! 전송 계층 연결
//!
//! 스트림 생성, 프레이밍, 그리고 상위 계층에 노출되는 연결 트레이트를 정의합니다.
//! 프레임 형식: 4바이트 little-endian 전체 길이(헤더 포함) + 페이로드.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures::future::BoxFuture;

use super::config::{ClusterConnectionMode, Credential, ServerAddress, ServerId};
use super::error::{DriverError, DriverResult};
use super::events::{ConnectionEvent, ConnectionListener};

/// 프레임 헤더 크기
pub const FRAME_HEADER_SIZE: usize = 4;

/// 최대 메시지 크기 (48MB)
pub const MAX_MESSAGE_SIZE: usize = 48 * 1024 * 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Stream - 바이트 스트림
// ============================================================================

/// 서버와의 바이트 스트림
pub trait Stream: Read + Write + Send {
    /// 대상 주소
    fn address(&self) -> &ServerAddress;

    /// 스트림 닫기
    fn close(&mut self);

    /// 닫힘 여부
    fn is_closed(&self) -> bool;
}

/// 스트림 생성 전략
pub trait StreamFactory: Send + Sync {
    /// 새 스트림 생성 (연결까지 수행)
    fn create(&self, address: &ServerAddress) -> DriverResult<Box<dyn Stream>>;
}

/// TCP 소켓 스트림 팩토리
#[derive(Debug, Clone)]
pub struct SocketStreamFactory {
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
}

impl SocketStreamFactory {
    /// 새 팩토리 생성
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout: None,
        }
    }

    /// 읽기 타임아웃 설정
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}

impl StreamFactory for SocketStreamFactory {
    fn create(&self, address: &ServerAddress) -> DriverResult<Box<dyn Stream>> {
        let addrs = address.to_socket_addr().to_socket_addrs().map_err(|e| {
            DriverError::connection(format!("Failed to resolve {}: {}", address, e))
        })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(socket) => {
                    // 지연 시간 감소
                    socket.set_nodelay(true).ok();
                    socket.set_read_timeout(self.read_timeout)?;
                    return Ok(Box::new(SocketStream {
                        address: address.clone(),
                        socket,
                        closed: false,
                    }));
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(DriverError::connection(match last_error {
            Some(e) => format!("Failed to connect to {}: {}", address, e),
            None => format!("No addresses resolved for {}", address),
        }))
    }
}

struct SocketStream {
    address: ServerAddress,
    socket: TcpStream,
    closed: bool,
}

impl Read for SocketStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.read(buf)
    }
}

impl Write for SocketStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.socket.flush()
    }
}

impl Stream for SocketStream {
    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.socket.shutdown(std::net::Shutdown::Both);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

// ============================================================================
// InternalConnection - 내부 전송 연결
// ============================================================================

/// 풀이 관리하는 전송 연결
pub trait InternalConnection: Send {
    /// 연결 ID
    fn id(&self) -> u64;

    /// 서버 식별자
    fn server_id(&self) -> &ServerId;

    /// 연결 열기 (블로킹)
    fn open(&mut self) -> DriverResult<()>;

    /// 열림 여부
    fn is_opened(&self) -> bool;

    /// 닫힘 여부
    fn is_closed(&self) -> bool;

    /// 페이로드 한 개를 프레임으로 전송
    fn send_message(&mut self, payload: &[u8]) -> DriverResult<()>;

    /// 프레임 한 개를 받아 페이로드 반환
    fn receive_message(&mut self) -> DriverResult<Bytes>;

    /// 연결 닫기
    fn close(&mut self);
}

/// 내부 연결 생성 전략
pub trait InternalConnectionFactory: Send + Sync {
    /// 아직 열리지 않은 연결 생성
    fn create(&self, server_id: &ServerId) -> Box<dyn InternalConnection>;
}

/// 스트림 기반 내부 연결 팩토리
///
/// 스트림 팩토리, 자격 증명, 연결 리스너를 묶습니다.
pub struct InternalStreamConnectionFactory {
    stream_factory: Arc<dyn StreamFactory>,
    credentials: Arc<[Credential]>,
    listener: Arc<dyn ConnectionListener>,
}

impl InternalStreamConnectionFactory {
    /// 새 팩토리 생성
    pub fn new(
        stream_factory: Arc<dyn StreamFactory>,
        credentials: Vec<Credential>,
        listener: Arc<dyn ConnectionListener>,
    ) -> Self {
        Self {
            stream_factory,
            credentials: credentials.into(),
            listener,
        }
    }

    /// 자격 증명
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }
}

impl fmt::Debug for InternalStreamConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalStreamConnectionFactory")
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl InternalConnectionFactory for InternalStreamConnectionFactory {
    fn create(&self, server_id: &ServerId) -> Box<dyn InternalConnection> {
        Box::new(InternalStreamConnection {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            server_id: server_id.clone(),
            stream_factory: self.stream_factory.clone(),
            credentials: self.credentials.clone(),
            listener: self.listener.clone(),
            stream: None,
            closed: false,
        })
    }
}

/// 스트림 기반 내부 연결
pub struct InternalStreamConnection {
    id: u64,
    server_id: ServerId,
    stream_factory: Arc<dyn StreamFactory>,
    credentials: Arc<[Credential]>,
    listener: Arc<dyn ConnectionListener>,
    stream: Option<Box<dyn Stream>>,
    closed: bool,
}

impl InternalStreamConnection {
    /// 이 연결에 적용된 자격 증명
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    fn event(&self) -> ConnectionEvent {
        ConnectionEvent {
            server_id: self.server_id.clone(),
            connection_id: self.id,
        }
    }

    fn stream_mut(&mut self) -> DriverResult<&mut Box<dyn Stream>> {
        match self.stream.as_mut() {
            Some(stream) if !self.closed => Ok(stream),
            _ => Err(DriverError::connection(format!(
                "Connection {} to {} is not open",
                self.id, self.server_id.address
            ))),
        }
    }

    fn fail<T>(&mut self, err: io::Error) -> DriverResult<T> {
        self.close();
        Err(err.into())
    }
}

impl InternalConnection for InternalStreamConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    fn open(&mut self) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::connection("Cannot reopen a closed connection"));
        }
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = self.stream_factory.create(&self.server_id.address)?;
        self.stream = Some(stream);
        tracing::debug!(connection_id = self.id, server = %self.server_id, "connection opened");
        self.listener.connection_opened(&self.event());
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.stream.is_some() && !self.closed
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn send_message(&mut self, payload: &[u8]) -> DriverResult<()> {
        let frame = encode_frame(payload)?;
        let stream = self.stream_mut()?;
        if let Err(e) = stream.write_all(&frame).and_then(|_| stream.flush()) {
            return self.fail(e);
        }
        Ok(())
    }

    fn receive_message(&mut self) -> DriverResult<Bytes> {
        let stream = self.stream_mut()?;

        let mut header = [0u8; FRAME_HEADER_SIZE];
        if let Err(e) = stream.read_exact(&mut header) {
            return self.fail(e);
        }

        let length = u32::from_le_bytes(header) as usize;
        if !(FRAME_HEADER_SIZE..=MAX_MESSAGE_SIZE).contains(&length) {
            self.close();
            return Err(DriverError::connection(format!("Invalid frame length {}", length)));
        }

        let mut body = vec![0u8; length - FRAME_HEADER_SIZE];
        let stream = self.stream_mut()?;
        if let Err(e) = stream.read_exact(&mut body) {
            return self.fail(e);
        }

        Ok(Bytes::from(body))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut stream) = self.stream.take() {
            stream.close();
            tracing::debug!(connection_id = self.id, server = %self.server_id, "connection closed");
            self.listener.connection_closed(&self.event());
        }
    }
}

impl fmt::Debug for InternalStreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalStreamConnection")
            .field("id", &self.id)
            .field("server_id", &self.server_id)
            .field("opened", &self.is_opened())
            .field("closed", &self.closed)
            .finish()
    }
}

/// 페이로드를 프레임으로 인코딩
pub fn encode_frame(payload: &[u8]) -> DriverResult<Bytes> {
    let length = payload.len() + FRAME_HEADER_SIZE;
    if length > MAX_MESSAGE_SIZE {
        return Err(DriverError::connection(format!(
            "Message of {} bytes exceeds the maximum of {}",
            length, MAX_MESSAGE_SIZE
        )));
    }

    let mut buf = BytesMut::with_capacity(length);
    buf.put_u32_le(length as u32);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

// ============================================================================
// Connection / AsyncConnection - 상위 계층 연결
// ============================================================================

/// 상위 계층에 노출되는 동기 연결
pub trait Connection: Send + Sync {
    /// 내부 연결 ID (해제된 경우 `None`)
    fn id(&self) -> Option<u64>;

    /// 서버 주소
    fn address(&self) -> &ServerAddress;

    /// 클러스터 연결 모드
    fn mode(&self) -> ClusterConnectionMode;

    /// 요청을 보내고 응답을 받음 (블로킹)
    fn send_and_receive(&self, payload: &[u8]) -> DriverResult<Bytes>;

    /// 참조 유지
    fn retain(&self);

    /// 참조 해제
    fn release(&self);
}

/// 상위 계층에 노출되는 비동기 연결
pub trait AsyncConnection: Send + Sync {
    /// 내부 연결 ID (해제된 경우 `None`)
    fn id(&self) -> Option<u64>;

    /// 서버 주소
    fn address(&self) -> &ServerAddress;

    /// 요청을 보내고 응답을 받음
    fn send_and_receive_async(self: Arc<Self>, payload: Bytes) -> BoxFuture<'static, DriverResult<Bytes>>;

    /// 참조 해제
    fn release(&self);
}
