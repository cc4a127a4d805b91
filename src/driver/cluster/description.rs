//! 서버/클러스터 상태 스냅샷
//!
//! 모니터가 교체하는 불변 값들입니다.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::super::config::{ClusterConnectionMode, ServerAddress};

/// 서버 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerType {
    /// 단독 서버
    Standalone,
    /// 복제 세트 프라이머리
    ReplicaSetPrimary,
    /// 복제 세트 세컨더리
    ReplicaSetSecondary,
    /// 복제 세트 아비터
    ReplicaSetArbiter,
    /// 기타 복제 세트 멤버 (숨김, 지연 등)
    ReplicaSetOther,
    /// 샤드 라우터
    ShardRouter,
    /// 알 수 없음
    #[default]
    Unknown,
}

impl ServerType {
    /// 쓰기를 받을 수 있는 역할인지
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Standalone | Self::ReplicaSetPrimary | Self::ShardRouter)
    }
}

/// 서버 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerConnectionState {
    /// 연결 시도 중
    #[default]
    Connecting,
    /// 연결됨
    Connected,
}

// ============================================================================
// ServerDescription - 서버 스냅샷
// ============================================================================

/// 서버 상태 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescription {
    /// 서버 주소
    pub address: ServerAddress,
    /// 서버 역할
    pub server_type: ServerType,
    /// 연결 상태
    pub state: ServerConnectionState,
    /// 마지막 측정 왕복 시간
    pub round_trip_time: Duration,
}

impl ServerDescription {
    /// 연결된 서버 스냅샷 생성
    pub fn new(address: ServerAddress, server_type: ServerType) -> Self {
        Self {
            address,
            server_type,
            state: ServerConnectionState::Connected,
            round_trip_time: Duration::ZERO,
        }
    }

    /// 아직 상태를 모르는 서버
    pub fn unknown(address: ServerAddress) -> Self {
        Self {
            address,
            server_type: ServerType::Unknown,
            state: ServerConnectionState::Connecting,
            round_trip_time: Duration::ZERO,
        }
    }

    /// 연결 상태 변경
    pub fn with_state(mut self, state: ServerConnectionState) -> Self {
        self.state = state;
        self
    }

    /// 왕복 시간 변경
    pub fn with_round_trip_time(mut self, round_trip_time: Duration) -> Self {
        self.round_trip_time = round_trip_time;
        self
    }

    /// 마지막 heartbeat가 성공했는지 (역할과 무관)
    pub fn is_ok(&self) -> bool {
        self.state == ServerConnectionState::Connected
    }

    /// 쓰기 가능한 서버인지
    pub fn is_primary(&self) -> bool {
        self.is_ok() && self.server_type.is_writable()
    }

    /// 세컨더리인지
    pub fn is_secondary(&self) -> bool {
        self.is_ok() && self.server_type == ServerType::ReplicaSetSecondary
    }
}

// ============================================================================
// ClusterDescription - 클러스터 스냅샷
// ============================================================================

/// 클러스터 상태 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDescription {
    /// 연결 모드
    pub mode: ClusterConnectionMode,
    /// 서버 스냅샷 목록
    pub servers: Vec<ServerDescription>,
}

impl ClusterDescription {
    /// 새 클러스터 스냅샷 생성
    pub fn new(mode: ClusterConnectionMode, servers: Vec<ServerDescription>) -> Self {
        Self { mode, servers }
    }

    /// 선택 가능한 모든 서버
    pub fn any(&self) -> Vec<ServerDescription> {
        self.filtered(ServerDescription::is_ok)
    }

    /// 쓰기 가능한 서버
    pub fn primaries(&self) -> Vec<ServerDescription> {
        self.filtered(ServerDescription::is_primary)
    }

    /// 세컨더리 서버
    pub fn secondaries(&self) -> Vec<ServerDescription> {
        self.filtered(ServerDescription::is_secondary)
    }

    /// 주소로 스냅샷 조회
    pub fn by_address(&self, address: &ServerAddress) -> Option<&ServerDescription> {
        self.servers.iter().find(|s| &s.address == address)
    }

    fn filtered(&self, predicate: impl Fn(&ServerDescription) -> bool) -> Vec<ServerDescription> {
        self.servers.iter().filter(|s| predicate(s)).cloned().collect()
    }
}
