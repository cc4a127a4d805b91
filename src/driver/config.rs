//! 클러스터/서버/풀 설정
//!
//! 서버 주소, 식별자, 자격 증명, 그리고 각 구성 요소의 불변 설정을 정의합니다.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{DriverError, DriverResult};

/// 기본 서버 포트
pub const DEFAULT_PORT: u16 = 27017;

// ============================================================================
// ServerAddress - 서버 주소
// ============================================================================

/// 서버 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerAddress {
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl ServerAddress {
    /// 새 서버 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// 소켓 주소로 변환
    pub fn to_socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for ServerAddress {
    type Err = DriverError;

    /// `host` 또는 `host:port` 형식 파싱
    fn from_str(s: &str) -> DriverResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DriverError::configuration("Empty server address"));
        }

        let parts: Vec<&str> = s.split(':').collect();
        match parts.len() {
            1 => Ok(Self::new(parts[0], DEFAULT_PORT)),
            2 => {
                let port = parts[1]
                    .parse()
                    .map_err(|_| DriverError::configuration(format!("Invalid port in '{}'", s)))?;
                Ok(Self::new(parts[0], port))
            }
            _ => Err(DriverError::configuration(format!("Invalid server address '{}'", s))),
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

// ============================================================================
// ClusterId / ServerId - 식별자
// ============================================================================

static NEXT_CLUSTER_ID: AtomicU64 = AtomicU64::new(1);

/// 클러스터 식별자
///
/// 프로세스 안에서 유일합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterId {
    value: u64,
    description: Option<String>,
}

impl ClusterId {
    /// 새 클러스터 식별자 생성
    pub fn new() -> Self {
        Self {
            value: NEXT_CLUSTER_ID.fetch_add(1, Ordering::Relaxed),
            description: None,
        }
    }

    /// 설명을 붙인 클러스터 식별자 생성
    pub fn with_description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::new()
        }
    }

    /// 식별자 값
    pub fn value(&self) -> u64 {
        self.value
    }

    /// 설명
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl Default for ClusterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "cluster-{} ({})", self.value, desc),
            None => write!(f, "cluster-{}", self.value),
        }
    }
}

/// 서버 식별자 (클러스터 + 주소)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerId {
    /// 클러스터 식별자
    pub cluster_id: ClusterId,
    /// 서버 주소
    pub address: ServerAddress,
}

impl ServerId {
    /// 새 서버 식별자 생성
    pub fn new(cluster_id: ClusterId, address: ServerAddress) -> Self {
        Self {
            cluster_id,
            address,
        }
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster_id, self.address)
    }
}

// ============================================================================
// ClusterConnectionMode - 클러스터 연결 모드
// ============================================================================

/// 클러스터 연결 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClusterConnectionMode {
    /// 단일 서버에 직접 연결
    Single,
    /// 여러 서버로 구성된 클러스터
    #[default]
    Multiple,
}

// ============================================================================
// Credential - 자격 증명
// ============================================================================

/// 자격 증명
///
/// 인증 자체는 이 계층의 범위 밖이며, 연결 팩토리에 그대로 전달됩니다.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// 인증 메커니즘
    pub mechanism: String,
    /// 사용자명
    pub username: String,
    /// 인증 소스 (데이터베이스)
    pub source: String,
    /// 비밀번호
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl Credential {
    /// 사용자명/비밀번호 자격 증명 생성
    pub fn plain(
        username: impl Into<String>,
        source: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            mechanism: "PLAIN".to_string(),
            username: username.into(),
            source: source.into(),
            password: Some(password.into()),
        }
    }

    /// 메커니즘 지정 자격 증명 생성
    pub fn with_mechanism(
        mechanism: impl Into<String>,
        username: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            mechanism: mechanism.into(),
            username: username.into(),
            source: source.into(),
            password: None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("source", &self.source)
            .field("password", &self.password.as_ref().map(|_| "<hidden>"))
            .finish()
    }
}

// ============================================================================
// ClusterSettings - 클러스터 설정
// ============================================================================

/// 클러스터 설정
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `hosts` | `localhost:27017` | 초기 서버 목록 |
/// | `mode` | `Multiple` | 연결 모드 |
/// | `server_selection_timeout` | 30초 | 서버 선택 최대 대기 시간 |
/// | `local_threshold` | 15ms | 지연 시간 허용 범위 |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// 서버 목록
    pub hosts: Vec<ServerAddress>,
    /// 연결 모드
    pub mode: ClusterConnectionMode,
    /// 서버 선택 타임아웃
    pub server_selection_timeout: Duration,
    /// 가장 빠른 서버 대비 허용 지연 시간
    pub local_threshold: Duration,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            hosts: vec![ServerAddress::default()],
            mode: ClusterConnectionMode::Multiple,
            server_selection_timeout: Duration::from_secs(30),
            local_threshold: Duration::from_millis(15),
        }
    }
}

impl ClusterSettings {
    /// 빌더 시작
    pub fn builder() -> ClusterSettingsBuilder {
        ClusterSettingsBuilder::default()
    }
}

/// 클러스터 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct ClusterSettingsBuilder {
    settings: ClusterSettings,
}

impl ClusterSettingsBuilder {
    /// 서버 목록 설정
    pub fn hosts(mut self, hosts: Vec<ServerAddress>) -> Self {
        self.settings.hosts = hosts;
        self
    }

    /// 연결 모드 설정
    pub fn mode(mut self, mode: ClusterConnectionMode) -> Self {
        self.settings.mode = mode;
        self
    }

    /// 서버 선택 타임아웃 설정
    pub fn server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.settings.server_selection_timeout = timeout;
        self
    }

    /// 지연 시간 허용 범위 설정
    pub fn local_threshold(mut self, threshold: Duration) -> Self {
        self.settings.local_threshold = threshold;
        self
    }

    /// 설정 빌드
    ///
    /// 서버 목록이 비어 있거나, 단일 모드인데 서버가 여러 개면 실패합니다.
    pub fn build(self) -> DriverResult<ClusterSettings> {
        if self.settings.hosts.is_empty() {
            return Err(DriverError::configuration("At least one host is required"));
        }
        if self.settings.mode == ClusterConnectionMode::Single && self.settings.hosts.len() > 1 {
            return Err(DriverError::configuration(
                "Single connection mode requires exactly one host",
            ));
        }
        Ok(self.settings)
    }
}

// ============================================================================
// ServerSettings - 서버 설정
// ============================================================================

/// 서버 설정 (모니터 동작)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// 헬스 체크 주기
    pub heartbeat_frequency: Duration,
    /// 즉시 체크 요청 시 최소 간격
    pub min_heartbeat_frequency: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            heartbeat_frequency: Duration::from_secs(10),
            min_heartbeat_frequency: Duration::from_millis(500),
        }
    }
}

impl ServerSettings {
    /// 빌더 시작
    pub fn builder() -> ServerSettingsBuilder {
        ServerSettingsBuilder::default()
    }
}

/// 서버 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct ServerSettingsBuilder {
    settings: ServerSettings,
}

impl ServerSettingsBuilder {
    /// 헬스 체크 주기 설정
    pub fn heartbeat_frequency(mut self, frequency: Duration) -> Self {
        self.settings.heartbeat_frequency = frequency;
        self
    }

    /// 최소 헬스 체크 간격 설정
    pub fn min_heartbeat_frequency(mut self, frequency: Duration) -> Self {
        self.settings.min_heartbeat_frequency = frequency;
        self
    }

    /// 설정 빌드
    pub fn build(self) -> ServerSettings {
        self.settings
    }
}

// ============================================================================
// ConnectionPoolSettings - 풀 설정
// ============================================================================

/// 연결 풀 설정
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `max_size` | 100 | 최대 연결 수 |
/// | `min_size` | 0 | 최소 연결 수 |
/// | `max_wait_time` | 2분 | 연결 획득 최대 대기 |
/// | `max_connection_life_time` | 0 (무제한) | 연결 최대 수명 |
/// | `max_connection_idle_time` | 0 (무제한) | 유휴 타임아웃 |
/// | `connect_timeout` | 10초 | 소켓 연결 타임아웃 |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPoolSettings {
    /// 최대 연결 수
    pub max_size: usize,
    /// 최소 연결 수
    pub min_size: usize,
    /// 연결 획득 최대 대기 시간
    pub max_wait_time: Duration,
    /// 연결 최대 수명 (0이면 무제한)
    pub max_connection_life_time: Duration,
    /// 유휴 타임아웃 (0이면 무제한)
    pub max_connection_idle_time: Duration,
    /// 소켓 연결 타임아웃
    pub connect_timeout: Duration,
}

impl Default for ConnectionPoolSettings {
    fn default() -> Self {
        Self {
            max_size: 100,
            min_size: 0,
            max_wait_time: Duration::from_secs(120),
            max_connection_life_time: Duration::ZERO,
            max_connection_idle_time: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionPoolSettings {
    /// 빌더 패턴으로 풀 설정 생성
    pub fn builder() -> ConnectionPoolSettingsBuilder {
        ConnectionPoolSettingsBuilder::default()
    }
}

/// 풀 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct ConnectionPoolSettingsBuilder {
    settings: ConnectionPoolSettings,
}

impl ConnectionPoolSettingsBuilder {
    /// 최대 연결 수 설정
    pub fn max_size(mut self, size: usize) -> Self {
        self.settings.max_size = size;
        self
    }

    /// 최소 연결 수 설정
    pub fn min_size(mut self, size: usize) -> Self {
        self.settings.min_size = size;
        self
    }

    /// 연결 획득 최대 대기 시간 설정
    pub fn max_wait_time(mut self, duration: Duration) -> Self {
        self.settings.max_wait_time = duration;
        self
    }

    /// 연결 최대 수명 설정
    pub fn max_connection_life_time(mut self, duration: Duration) -> Self {
        self.settings.max_connection_life_time = duration;
        self
    }

    /// 유휴 타임아웃 설정
    pub fn max_connection_idle_time(mut self, duration: Duration) -> Self {
        self.settings.max_connection_idle_time = duration;
        self
    }

    /// 소켓 연결 타임아웃 설정
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.settings.connect_timeout = duration;
        self
    }

    /// 설정 빌드
    pub fn build(self) -> DriverResult<ConnectionPoolSettings> {
        if self.settings.max_size == 0 {
            return Err(DriverError::configuration("max_size must be greater than zero"));
        }
        if self.settings.min_size > self.settings.max_size {
            return Err(DriverError::configuration("min_size must not exceed max_size"));
        }
        Ok(self.settings)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_address_parse() {
        let addr: ServerAddress = "db1:27018".parse().unwrap();
        assert_eq!(addr, ServerAddress::new("db1", 27018));

        let addr: ServerAddress = "db2".parse().unwrap();
        assert_eq!(addr.port, DEFAULT_PORT);

        assert!("db1:abc".parse::<ServerAddress>().is_err());
        assert!("a:b:c".parse::<ServerAddress>().is_err());
        assert!("".parse::<ServerAddress>().is_err());
    }

    #[test]
    fn test_server_address_display() {
        let addr = ServerAddress::new("localhost", 27017);
        assert_eq!(addr.to_string(), "localhost:27017");
        assert_eq!(addr.to_socket_addr(), "localhost:27017");
    }

    #[test]
    fn test_cluster_id_unique() {
        let a = ClusterId::new();
        let b = ClusterId::new();
        assert_ne!(a, b);

        let named = ClusterId::with_description("reporting");
        assert_eq!(named.description(), Some("reporting"));
        assert!(named.to_string().contains("reporting"));
    }

    #[test]
    fn test_server_id_keyed_by_cluster_and_address() {
        let cluster = ClusterId::new();
        let a = ServerId::new(cluster.clone(), ServerAddress::new("a", 1));
        let b = ServerId::new(cluster.clone(), ServerAddress::new("b", 1));
        assert_ne!(a, b);
        assert_eq!(a, ServerId::new(cluster, ServerAddress::new("a", 1)));
    }

    #[test]
    fn test_credential_debug_hides_password() {
        let cred = Credential::plain("alice", "admin", "secret");
        let debug = format!("{:?}", cred);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_cluster_settings_builder() {
        let settings = ClusterSettings::builder()
            .hosts(vec![ServerAddress::new("a", 1), ServerAddress::new("b", 2)])
            .server_selection_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(settings.hosts.len(), 2);
        assert_eq!(settings.mode, ClusterConnectionMode::Multiple);
        assert_eq!(settings.server_selection_timeout, Duration::from_secs(5));
        assert_eq!(settings.local_threshold, Duration::from_millis(15));
    }

    #[test]
    fn test_cluster_settings_validation() {
        assert!(ClusterSettings::builder().hosts(vec![]).build().is_err());

        let result = ClusterSettings::builder()
            .mode(ClusterConnectionMode::Single)
            .hosts(vec![ServerAddress::new("a", 1), ServerAddress::new("b", 2)])
            .build();
        assert!(matches!(result, Err(DriverError::Configuration(_))));
    }

    #[test]
    fn test_pool_settings_builder() {
        let settings = ConnectionPoolSettings::builder()
            .max_size(10)
            .min_size(2)
            .max_wait_time(Duration::from_millis(50))
            .build()
            .unwrap();
        assert_eq!(settings.max_size, 10);
        assert_eq!(settings.min_size, 2);
        assert_eq!(settings.max_wait_time, Duration::from_millis(50));

        assert!(ConnectionPoolSettings::builder().max_size(0).build().is_err());
        assert!(ConnectionPoolSettings::builder().max_size(1).min_size(2).build().is_err());
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: ServerSettings =
            serde_json::from_str(r#"{"heartbeat_frequency":{"secs":2,"nanos":0}}"#).unwrap();
        assert_eq!(settings.heartbeat_frequency, Duration::from_secs(2));
        assert_eq!(settings.min_heartbeat_frequency, Duration::from_millis(500));

        let mode: ClusterConnectionMode = serde_json::from_str(r#""single""#).unwrap();
        assert_eq!(mode, ClusterConnectionMode::Single);
    }
}
