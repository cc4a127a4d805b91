//! Binding Module
//!
//! 읽기/쓰기 작업이 사용할 서버와 연결을 결정하는 바인딩.
//!
//! # Example
//!
//! ```ignore
//! use affinity_driver::driver::binding::{ReadBinding, ThreadAffinityBinding, WriteBinding};
//! use affinity_driver::driver::cluster::ReadPreference;
//!
//! let binding = ThreadAffinityBinding::new(cluster, ReadPreference::SecondaryPreferred);
//! let _scope = binding.scope();
//!
//! // 같은 스레드에서는 같은 소스와 같은 연결이 재사용됨
//! let reply = binding.read_connection_source()?.connection()?.send_and_receive(b"...")?;
//! let ack = binding.write_connection_source()?.connection()?.send_and_receive(b"...")?;
//! // _scope drop 시 이 스레드의 캐시와 연결 해제
//! ```

mod connection_source;
mod thread_affinity;

pub use connection_source::ClusterBindingConnectionSource;
pub use thread_affinity::{BindingScope, ThreadAffinityBinding, ThreadAffinityBindingBuilder};

use std::sync::Arc;

use super::cluster::{ReadPreference, ServerDescription};
use super::connection::Connection;
use super::error::DriverResult;

/// 참조 카운트 인터페이스
///
/// 이 모듈의 구현은 모두 아무것도 하지 않습니다. 자원 회수는 teardown으로만 일어납니다.
pub trait ReferenceCounted {
    /// 참조 증가
    fn retain(&self);

    /// 참조 감소
    fn release(&self);
}

/// 서버 하나와, 필요할 때 만들어지는 연결 하나에 대한 바인딩
pub trait ConnectionSource: ReferenceCounted + Send + Sync {
    /// 바인딩된 서버의 현재 상태 (재선택 없음)
    fn server_description(&self) -> ServerDescription;

    /// 연결 (첫 호출 시 생성 후 캐시)
    fn connection(&self) -> DriverResult<Arc<dyn Connection>>;
}

/// 읽기 바인딩
pub trait ReadBinding: ReferenceCounted + Send + Sync {
    /// 읽기 선호도
    fn read_preference(&self) -> ReadPreference;

    /// 읽기용 커넥션 소스
    fn read_connection_source(&self) -> DriverResult<Arc<dyn ConnectionSource>>;
}

/// 쓰기 바인딩
pub trait WriteBinding: ReferenceCounted + Send + Sync {
    /// 쓰기용 커넥션 소스
    fn write_connection_source(&self) -> DriverResult<Arc<dyn ConnectionSource>>;
}

/// 읽기/쓰기 바인딩
pub trait ReadWriteBinding: ReadBinding + WriteBinding {}

impl<T: ReadBinding + WriteBinding> ReadWriteBinding for T {}
