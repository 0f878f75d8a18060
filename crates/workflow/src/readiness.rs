//! 준비 상태 대기
//!
//! 고정 시간 대기 대신 리소스가 준비되었는지 주기적으로 확인하고,
//! 고정 시간은 상한(ceiling)으로만 사용합니다. 상한에 도달하는 것은
//! 에러가 아니라 고정 대기와 같은 결과입니다.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use infraprobe_core::config::ReadinessSection;
use infraprobe_core::metrics as m;

use crate::backend::ResourceQuery;

/// 준비 상태 대기 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// 최대 대기 시간
    pub ceiling: Duration,
    /// 폴링 주기
    pub poll_interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            ceiling: Duration::from_secs(300),
            poll_interval: Duration::from_secs(15),
        }
    }
}

impl ReadinessPolicy {
    pub fn from_core(section: &ReadinessSection) -> Self {
        Self {
            ceiling: Duration::from_secs(section.ceiling_secs),
            poll_interval: Duration::from_secs(section.poll_interval_secs),
        }
    }
}

/// 준비 상태 대기 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessOutcome {
    /// 모든 대상이 준비됨
    Ready { polls: u32, elapsed: Duration },
    /// 상한까지 대기함
    CeilingReached { polls: u32, elapsed: Duration },
}

impl ReadinessOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Ready { elapsed, .. } | Self::CeilingReached { elapsed, .. } => *elapsed,
        }
    }
}

/// 고정 시간 동안 대기합니다.
pub async fn await_fixed(duration: Duration) {
    info!(wait_secs = duration.as_secs(), "waiting for infrastructure to settle");
    tokio::time::sleep(duration).await;
    metrics::histogram!(m::READINESS_WAIT_SECONDS).record(duration.as_secs_f64());
}

/// 모든 `ids`가 준비될 때까지 폴링합니다.
///
/// - 조회 에러는 "아직 준비되지 않음"으로 간주하고 경고만 남깁니다.
/// - `ids`가 비어 있으면 확인할 대상이 없으므로 상한까지 고정 대기합니다.
/// - 준비된 대상은 다시 조회하지 않습니다.
pub async fn wait_until_ready<Q: ResourceQuery>(
    query: &Q,
    region: &str,
    ids: &[String],
    policy: &ReadinessPolicy,
) -> ReadinessOutcome {
    let start = Instant::now();

    if ids.is_empty() {
        await_fixed(policy.ceiling).await;
        return ReadinessOutcome::CeilingReached {
            polls: 0,
            elapsed: start.elapsed(),
        };
    }

    let mut pending: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
    let mut polls: u32 = 0;

    loop {
        polls += 1;
        let mut newly_ready = Vec::new();
        for id in &pending {
            match query.is_ready(region, id).await {
                Ok(true) => newly_ready.push(*id),
                Ok(false) => {}
                Err(e) => warn!(region, id, error = %e, "readiness query failed, treating as not ready"),
            }
        }
        for id in newly_ready {
            pending.remove(id);
            debug!(region, id, polls, "resource ready");
        }

        let elapsed = start.elapsed();
        if pending.is_empty() {
            info!(region, polls, elapsed_secs = elapsed.as_secs(), "all resources ready");
            metrics::histogram!(m::READINESS_WAIT_SECONDS).record(elapsed.as_secs_f64());
            return ReadinessOutcome::Ready { polls, elapsed };
        }

        if elapsed >= policy.ceiling {
            warn!(
                region,
                polls,
                pending = pending.len(),
                ceiling_secs = policy.ceiling.as_secs(),
                "readiness ceiling reached, continuing"
            );
            metrics::histogram!(m::READINESS_WAIT_SECONDS).record(elapsed.as_secs_f64());
            return ReadinessOutcome::CeilingReached { polls, elapsed };
        }

        let remaining = policy.ceiling - elapsed;
        tokio::time::sleep(policy.poll_interval.min(remaining)).await;
    }
}
