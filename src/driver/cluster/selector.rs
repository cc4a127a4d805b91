//! 서버 선택 정책
//!
//! 클러스터 스냅샷에서 후보 서버를 고르는 무상태 선택기들입니다.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::super::config::ClusterConnectionMode;
use super::super::error::{DriverError, DriverResult};
use super::description::{ClusterDescription, ServerDescription, ServerType};

// ============================================================================
// ReadPreference - 읽기 선호도
// ============================================================================

/// 읽기 선호도
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    /// 프라이머리에서만 읽기 (기본값)
    #[default]
    Primary,
    /// 프라이머리 우선, 없으면 세컨더리
    PrimaryPreferred,
    /// 세컨더리에서만 읽기
    Secondary,
    /// 세컨더리 우선, 없으면 프라이머리
    SecondaryPreferred,
    /// 역할 무관
    Nearest,
}

impl ReadPreference {
    /// 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::PrimaryPreferred => "primaryPreferred",
            Self::Secondary => "secondary",
            Self::SecondaryPreferred => "secondaryPreferred",
            Self::Nearest => "nearest",
        }
    }

    /// 복제 세트 스냅샷에서 후보 선택
    pub fn choose(&self, cluster: &ClusterDescription) -> Vec<ServerDescription> {
        match self {
            Self::Primary => cluster.primaries(),
            Self::PrimaryPreferred => {
                let primaries = cluster.primaries();
                if primaries.is_empty() {
                    cluster.secondaries()
                } else {
                    primaries
                }
            }
            Self::Secondary => cluster.secondaries(),
            Self::SecondaryPreferred => {
                let secondaries = cluster.secondaries();
                if secondaries.is_empty() {
                    cluster.primaries()
                } else {
                    secondaries
                }
            }
            Self::Nearest => {
                let mut servers = cluster.primaries();
                servers.extend(cluster.secondaries());
                servers
            }
        }
    }
}

impl FromStr for ReadPreference {
    type Err = DriverError;

    fn from_str(s: &str) -> DriverResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "primarypreferred" => Ok(Self::PrimaryPreferred),
            "secondary" => Ok(Self::Secondary),
            "secondarypreferred" => Ok(Self::SecondaryPreferred),
            "nearest" => Ok(Self::Nearest),
            _ => Err(DriverError::configuration(format!("Unknown read preference '{}'", s))),
        }
    }
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ServerSelector - 서버 선택기
// ============================================================================

/// 서버 선택기
///
/// 후보가 없으면 빈 목록을 반환합니다. 대기와 타임아웃은 클러스터의 몫입니다.
pub trait ServerSelector: fmt::Debug + Send + Sync {
    /// 후보 서버 선택
    fn select(&self, cluster: &ClusterDescription) -> Vec<ServerDescription>;
}

/// 샤드 라우터가 있으면 샤드 클러스터로 간주
fn is_sharded(cluster: &ClusterDescription) -> bool {
    cluster
        .servers
        .iter()
        .any(|s| s.server_type == ServerType::ShardRouter)
}

/// 읽기 선호도 기반 선택기
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPreferenceServerSelector {
    read_preference: ReadPreference,
}

impl ReadPreferenceServerSelector {
    /// 새 선택기 생성
    pub fn new(read_preference: ReadPreference) -> Self {
        Self { read_preference }
    }

    /// 읽기 선호도
    pub fn read_preference(&self) -> ReadPreference {
        self.read_preference
    }
}

impl ServerSelector for ReadPreferenceServerSelector {
    fn select(&self, cluster: &ClusterDescription) -> Vec<ServerDescription> {
        if cluster.mode == ClusterConnectionMode::Single || is_sharded(cluster) {
            return cluster.any();
        }
        self.read_preference.choose(cluster)
    }
}

/// 쓰기 가능 서버 선택기
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WritableServerSelector;

impl WritableServerSelector {
    /// 새 선택기 생성
    pub fn new() -> Self {
        Self
    }
}

impl ServerSelector for WritableServerSelector {
    fn select(&self, cluster: &ClusterDescription) -> Vec<ServerDescription> {
        if cluster.mode == ClusterConnectionMode::Single || is_sharded(cluster) {
            return cluster.any();
        }
        cluster.primaries()
    }
}

/// 지연 시간 최소화 선택기
///
/// 가장 빠른 서버의 왕복 시간 + 허용 범위 안의 서버만 남깁니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyMinimizingServerSelector {
    threshold: Duration,
}

impl LatencyMinimizingServerSelector {
    /// 새 선택기 생성
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }
}

impl ServerSelector for LatencyMinimizingServerSelector {
    fn select(&self, cluster: &ClusterDescription) -> Vec<ServerDescription> {
        let candidates = cluster.any();
        let fastest = match candidates.iter().map(|s| s.round_trip_time).min() {
            Some(rtt) => rtt,
            None => return Vec::new(),
        };

        let limit = fastest.saturating_add(self.threshold);
        candidates
            .into_iter()
            .filter(|s| s.round_trip_time <= limit)
            .collect()
    }
}

/// 선택기 체인
///
/// 앞 선택기의 결과만 담은 스냅샷을 다음 선택기에 넘깁니다.
#[derive(Debug, Clone)]
pub struct CompositeServerSelector {
    selectors: Vec<Arc<dyn ServerSelector>>,
}

impl CompositeServerSelector {
    /// 새 선택기 체인 생성
    pub fn new(selectors: Vec<Arc<dyn ServerSelector>>) -> Self {
        Self { selectors }
    }
}

impl ServerSelector for CompositeServerSelector {
    fn select(&self, cluster: &ClusterDescription) -> Vec<ServerDescription> {
        let mut current = cluster.clone();
        for selector in &self.selectors {
            let chosen = selector.select(&current);
            if chosen.is_empty() {
                return chosen;
            }
            current = ClusterDescription::new(cluster.mode, chosen);
        }
        current.servers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::config::ServerAddress;

    fn server(host: &str, server_type: ServerType, rtt_ms: u64) -> ServerDescription {
        ServerDescription::new(ServerAddress::new(host, 27017), server_type)
            .with_round_trip_time(Duration::from_millis(rtt_ms))
    }

    fn replica_set(servers: Vec<ServerDescription>) -> ClusterDescription {
        ClusterDescription::new(ClusterConnectionMode::Multiple, servers)
    }

    fn hosts(servers: &[ServerDescription]) -> Vec<&str> {
        servers.iter().map(|s| s.address.host.as_str()).collect()
    }

    #[test]
    fn test_read_preference_parse() {
        assert_eq!("primary".parse::<ReadPreference>().unwrap(), ReadPreference::Primary);
        assert_eq!(
            "secondaryPreferred".parse::<ReadPreference>().unwrap(),
            ReadPreference::SecondaryPreferred
        );
        assert_eq!("NEAREST".parse::<ReadPreference>().unwrap(), ReadPreference::Nearest);
        assert!("closest".parse::<ReadPreference>().is_err());
        assert_eq!(ReadPreference::PrimaryPreferred.to_string(), "primaryPreferred");
    }

    #[test]
    fn test_read_preference_serde() {
        let pref: ReadPreference = serde_json::from_str(r#""secondaryPreferred""#).unwrap();
        assert_eq!(pref, ReadPreference::SecondaryPreferred);
        assert_eq!(serde_json::to_string(&ReadPreference::Nearest).unwrap(), r#""nearest""#);
    }

    #[test]
    fn test_read_preference_choose() {
        let cluster = replica_set(vec![
            server("p", ServerType::ReplicaSetPrimary, 5),
            server("s", ServerType::ReplicaSetSecondary, 5),
            server("arb", ServerType::ReplicaSetArbiter, 5),
        ]);

        assert_eq!(hosts(&ReadPreference::Primary.choose(&cluster)), vec!["p"]);
        assert_eq!(hosts(&ReadPreference::Secondary.choose(&cluster)), vec!["s"]);
        assert_eq!(hosts(&ReadPreference::PrimaryPreferred.choose(&cluster)), vec!["p"]);
        assert_eq!(hosts(&ReadPreference::SecondaryPreferred.choose(&cluster)), vec!["s"]);
        assert_eq!(hosts(&ReadPreference::Nearest.choose(&cluster)), vec!["p", "s"]);
    }

    #[test]
    fn test_read_preference_fallbacks() {
        let only_primary = replica_set(vec![server("p", ServerType::ReplicaSetPrimary, 5)]);
        assert_eq!(hosts(&ReadPreference::SecondaryPreferred.choose(&only_primary)), vec!["p"]);
        assert!(ReadPreference::Secondary.choose(&only_primary).is_empty());

        let only_secondary = replica_set(vec![server("s", ServerType::ReplicaSetSecondary, 5)]);
        assert_eq!(hosts(&ReadPreference::PrimaryPreferred.choose(&only_secondary)), vec!["s"]);
        assert!(ReadPreference::Primary.choose(&only_secondary).is_empty());
    }

    #[test]
    fn test_single_mode_ignores_read_preference() {
        let cluster = ClusterDescription::new(
            ClusterConnectionMode::Single,
            vec![server("s", ServerType::ReplicaSetSecondary, 5)],
        );

        let selector = ReadPreferenceServerSelector::new(ReadPreference::Primary);
        assert_eq!(hosts(&selector.select(&cluster)), vec!["s"]);
        assert_eq!(hosts(&WritableServerSelector::new().select(&cluster)), vec!["s"]);
    }

    #[test]
    fn test_sharded_cluster_selects_routers() {
        let cluster = replica_set(vec![
            server("r1", ServerType::ShardRouter, 5),
            server("r2", ServerType::ShardRouter, 5),
        ]);

        let selector = ReadPreferenceServerSelector::new(ReadPreference::Secondary);
        assert_eq!(selector.select(&cluster).len(), 2);
        assert_eq!(WritableServerSelector::new().select(&cluster).len(), 2);
    }

    #[test]
    fn test_writable_selector() {
        let cluster = replica_set(vec![
            server("p", ServerType::ReplicaSetPrimary, 5),
            server("s", ServerType::ReplicaSetSecondary, 5),
        ]);
        assert_eq!(hosts(&WritableServerSelector::new().select(&cluster)), vec!["p"]);

        let no_primary = replica_set(vec![server("s", ServerType::ReplicaSetSecondary, 5)]);
        assert!(WritableServerSelector::new().select(&no_primary).is_empty());
    }

    #[test]
    fn test_latency_minimizing_selector() {
        let cluster = replica_set(vec![
            server("fast", ServerType::ReplicaSetSecondary, 2),
            server("near", ServerType::ReplicaSetSecondary, 10),
            server("slow", ServerType::ReplicaSetSecondary, 40),
        ]);

        let selector = LatencyMinimizingServerSelector::new(Duration::from_millis(15));
        assert_eq!(hosts(&selector.select(&cluster)), vec!["fast", "near"]);

        let empty = replica_set(vec![]);
        assert!(selector.select(&empty).is_empty());
    }

    #[test]
    fn test_composite_selector() {
        let cluster = replica_set(vec![
            server("p", ServerType::ReplicaSetPrimary, 1),
            server("s1", ServerType::ReplicaSetSecondary, 30),
            server("s2", ServerType::ReplicaSetSecondary, 35),
        ]);

        let selector = CompositeServerSelector::new(vec![
            Arc::new(ReadPreferenceServerSelector::new(ReadPreference::Secondary)),
            Arc::new(LatencyMinimizingServerSelector::new(Duration::from_millis(1))),
        ]);

        // 지연 시간 필터는 세컨더리 후보 안에서만 적용
        assert_eq!(hosts(&selector.select(&cluster)), vec!["s1"]);
    }
}
