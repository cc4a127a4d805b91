//! Cluster Module
//!
//! 클러스터 상태 스냅샷, 서버 선택기, 서버 선택을 수행하는 클러스터.

mod cluster;
mod description;
mod selector;

pub use cluster::DefaultCluster;
pub use description::{ClusterDescription, ServerConnectionState, ServerDescription, ServerType};
pub use selector::{
    CompositeServerSelector, LatencyMinimizingServerSelector, ReadPreference, ReadPreferenceServerSelector,
    ServerSelector, WritableServerSelector,
};

use std::sync::Arc;

use super::config::ClusterSettings;
use super::error::DriverResult;
use super::server::Server;

/// 클러스터
pub trait Cluster: Send + Sync {
    /// 클러스터 설정
    fn settings(&self) -> &ClusterSettings;

    /// 현재 스냅샷
    fn description(&self) -> ClusterDescription;

    /// 선택기에 맞는 서버 선택
    ///
    /// 맞는 서버가 없으면 `server_selection_timeout`까지 상태 변화를 기다린 뒤
    /// [`DriverError::ServerSelectionTimeout`](super::error::DriverError::ServerSelectionTimeout)으로 실패합니다.
    fn select_server(&self, selector: &dyn ServerSelector) -> DriverResult<Arc<dyn Server>>;

    /// 클러스터 닫기
    fn close(&self);

    /// 닫힘 여부
    fn is_closed(&self) -> bool;
}
