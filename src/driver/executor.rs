//! 프로토콜 실행기
//!
//! 요청 한 개를 내부 연결로 보내고 응답을 받으며 커맨드 이벤트를 발생시킵니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use super::connection::InternalConnection;
use super::error::DriverResult;
use super::events::{CommandEvent, CommandListener};

/// 프로토콜 실행기
pub trait ProtocolExecutor: Send + Sync {
    /// 요청/응답 한 번 수행
    fn execute(&self, payload: &[u8], connection: &mut dyn InternalConnection) -> DriverResult<Bytes>;
}

/// 기본 실행기
pub struct DefaultProtocolExecutor {
    listener: Arc<dyn CommandListener>,
    next_request_id: AtomicU64,
}

impl DefaultProtocolExecutor {
    /// 새 실행기 생성
    pub fn new(listener: Arc<dyn CommandListener>) -> Self {
        Self {
            listener,
            next_request_id: AtomicU64::new(1),
        }
    }
}

impl ProtocolExecutor for DefaultProtocolExecutor {
    fn execute(&self, payload: &[u8], connection: &mut dyn InternalConnection) -> DriverResult<Bytes> {
        let event = CommandEvent {
            request_id: self.next_request_id.fetch_add(1, Ordering::Relaxed),
            connection_id: connection.id(),
            address: connection.server_id().address.clone(),
            request_size: payload.len(),
        };

        self.listener.command_started(&event);
        let started = Instant::now();

        let result = connection
            .send_message(payload)
            .and_then(|_| connection.receive_message());

        match &result {
            Ok(_) => self.listener.command_succeeded(&event, started.elapsed()),
            Err(e) => {
                tracing::debug!(request_id = event.request_id, address = %event.address, "command failed: {}", e);
                self.listener
                    .command_failed(&event, started.elapsed(), &e.to_string());
            }
        }
        result
    }
}

impl std::fmt::Debug for DefaultProtocolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultProtocolExecutor")
            .field("next_request_id", &self.next_request_id.load(Ordering::Relaxed))
            .finish()
    }
}
