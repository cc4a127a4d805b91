//! 이벤트 리스너
//!
//! 연결, 풀, 커맨드 이벤트를 관찰하는 훅입니다. 모든 메서드는 기본적으로 아무것도 하지 않습니다.

use std::time::Duration;

use super::config::{ServerAddress, ServerId};

/// 연결 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// 서버 식별자
    pub server_id: ServerId,
    /// 연결 ID
    pub connection_id: u64,
}

/// 커맨드 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    /// 요청 ID
    pub request_id: u64,
    /// 연결 ID
    pub connection_id: u64,
    /// 서버 주소
    pub address: ServerAddress,
    /// 요청 크기 (바이트)
    pub request_size: usize,
}

/// 연결 리스너
pub trait ConnectionListener: Send + Sync {
    /// 연결 열림
    fn connection_opened(&self, _event: &ConnectionEvent) {}

    /// 연결 닫힘
    fn connection_closed(&self, _event: &ConnectionEvent) {}
}

/// 연결 풀 리스너
pub trait ConnectionPoolListener: Send + Sync {
    /// 풀 생성
    fn pool_opened(&self, _server_id: &ServerId) {}

    /// 풀 닫힘
    fn pool_closed(&self, _server_id: &ServerId) {}

    /// 연결 추가
    fn connection_added(&self, _event: &ConnectionEvent) {}

    /// 연결 제거
    fn connection_removed(&self, _event: &ConnectionEvent) {}

    /// 연결 체크아웃
    fn connection_checked_out(&self, _event: &ConnectionEvent) {}

    /// 연결 체크인
    fn connection_checked_in(&self, _event: &ConnectionEvent) {}

    /// 대기 큐 타임아웃
    fn wait_queue_timed_out(&self, _server_id: &ServerId) {}
}

/// 커맨드 리스너
pub trait CommandListener: Send + Sync {
    /// 커맨드 시작
    fn command_started(&self, _event: &CommandEvent) {}

    /// 커맨드 성공
    fn command_succeeded(&self, _event: &CommandEvent, _elapsed: Duration) {}

    /// 커맨드 실패
    fn command_failed(&self, _event: &CommandEvent, _elapsed: Duration, _error: &str) {}
}

/// 아무것도 하지 않는 리스너
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpListener;

impl ConnectionListener for NoOpListener {}
impl ConnectionPoolListener for NoOpListener {}
impl CommandListener for NoOpListener {}
