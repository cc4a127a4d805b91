//! 기본 클러스터 구현

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use rand::Rng;

use super::description::ClusterDescription;
use super::selector::{LatencyMinimizingServerSelector, ServerSelector};
use super::Cluster;
use crate::driver::config::{ClusterId, ClusterSettings, ServerAddress};
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::server::{ClusterableServer, ClusterableServerFactory, Server};

/// 서버 상태 변화 알림
#[derive(Default)]
struct ChangeSignal {
    generation: Mutex<u64>,
    changed: Condvar,
}

impl ChangeSignal {
    fn current(&self) -> u64 {
        *self.generation.lock()
    }

    fn bump(&self) {
        *self.generation.lock() += 1;
        self.changed.notify_all();
    }
}

/// 기본 클러스터
///
/// 설정된 호스트마다 서버 팩토리로 서버를 만들고 모니터를 시작합니다.
/// 클러스터 ID와 설정은 서버 팩토리의 것을 그대로 사용합니다.
pub struct DefaultCluster {
    cluster_id: ClusterId,
    settings: ClusterSettings,
    servers: Vec<Arc<dyn ClusterableServer>>,
    latency: LatencyMinimizingServerSelector,
    signal: Arc<ChangeSignal>,
    closed: AtomicBool,
}

impl DefaultCluster {
    /// 새 클러스터 생성
    pub fn new(server_factory: Arc<dyn ClusterableServerFactory>) -> DriverResult<Self> {
        let cluster_id = server_factory.cluster_id().clone();
        let settings = server_factory.cluster_settings().clone();
        if settings.hosts.is_empty() {
            return Err(DriverError::configuration("At least one host is required"));
        }

        let signal = Arc::new(ChangeSignal::default());
        let mut servers = Vec::with_capacity(settings.hosts.len());
        for address in &settings.hosts {
            let server = server_factory.create(address.clone());
            let signal = signal.clone();
            server.add_change_listener(Arc::new(move |_| signal.bump()));
            servers.push(server);
        }

        for server in &servers {
            server.connect()?;
        }

        tracing::debug!(
            cluster = %cluster_id,
            hosts = settings.hosts.len(),
            mode = ?settings.mode,
            "cluster opened"
        );

        Ok(Self {
            cluster_id,
            latency: LatencyMinimizingServerSelector::new(settings.local_threshold),
            settings,
            servers,
            signal,
            closed: AtomicBool::new(false),
        })
    }

    /// 클러스터 ID
    pub fn cluster_id(&self) -> &ClusterId {
        &self.cluster_id
    }

    /// 주소로 서버 조회
    pub fn server(&self, address: &ServerAddress) -> Option<Arc<dyn ClusterableServer>> {
        self.servers
            .iter()
            .find(|s| s.address() == address)
            .cloned()
    }

    fn choose(&self, selector: &dyn ServerSelector) -> Option<Arc<dyn ClusterableServer>> {
        let description = self.description();
        let selected = selector.select(&description);
        let candidates = self
            .latency
            .select(&ClusterDescription::new(description.mode, selected));

        if candidates.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..candidates.len());
        self.server(&candidates[index].address)
    }
}

impl Cluster for DefaultCluster {
    fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    fn description(&self) -> ClusterDescription {
        ClusterDescription::new(
            self.settings.mode,
            self.servers.iter().map(|s| s.description()).collect(),
        )
    }

    fn select_server(&self, selector: &dyn ServerSelector) -> DriverResult<Arc<dyn Server>> {
        let timeout = self.settings.server_selection_timeout;
        let deadline = Instant::now() + timeout;

        loop {
            if self.is_closed() {
                return Err(DriverError::connection(format!("Cluster {} is closed", self.cluster_id)));
            }

            // 스냅샷보다 먼저 세대를 읽어 그 사이의 변화를 놓치지 않음
            let seen = self.signal.current();
            if let Some(server) = self.choose(selector) {
                tracing::debug!(cluster = %self.cluster_id, address = %server.address(), "selected server");
                return Ok(server.into_server());
            }

            let mut generation = self.signal.generation.lock();
            if *generation == seen
                && self.signal.changed.wait_until(&mut generation, deadline).timed_out()
                && *generation == seen
            {
                return Err(DriverError::server_selection_timeout(format!(
                    "Timed out after {:?} while waiting for a server that matches {:?}. Cluster description: {:?}",
                    timeout,
                    selector,
                    self.description()
                )));
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for server in &self.servers {
            server.close();
        }
        self.signal.bump();
        tracing::debug!(cluster = %self.cluster_id, "cluster closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for DefaultCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultCluster")
            .field("cluster_id", &self.cluster_id)
            .field("settings", &self.settings)
            .field("closed", &self.is_closed())
            .finish()
    }
}
