//! Driver Error Types
//!
//! 드라이버 에러 정의

use std::io;
use thiserror::Error;

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
#[derive(Error, Debug)]
pub enum DriverError {
    /// 설정/인자 검증 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 서버 선택 타임아웃
    #[error("Server selection timeout: {0}")]
    ServerSelectionTimeout(String),

    /// 연결 에러
    #[error("Connection error: {0}")]
    Connection(String),

    /// 타임아웃 에러 (연결 획득 대기 등)
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 풀 에러
    #[error("Pool error: {0}")]
    Pool(String),

    /// I/O 에러
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 내부 에러
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DriverError {
    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 서버 선택 타임아웃 생성
    pub fn server_selection_timeout(msg: impl Into<String>) -> Self {
        Self::ServerSelectionTimeout(msg.into())
    }

    /// 연결 에러 생성
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// 타임아웃 에러 생성
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// 풀 에러 생성
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    /// 내부 에러 생성
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 재시도 가능 여부
    ///
    /// 이 계층은 재시도하지 않습니다. 상위 계층의 판단용입니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::ServerSelectionTimeout(_) | Self::Io(_)
        )
    }

    /// 클라이언트 에러 여부
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// 연결 획득 실패 여부 (전송 계층 또는 풀 고갈)
    pub fn is_connection_acquisition_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Pool(_) | Self::Io(_)
        )
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// Tests
// ============================================================================
