//! ### 修改记录 (2026-03-05)
//! - 原因: 需要分离重放前的过期判断
//! - 目的: 陈旧判定策略与重放执行解耦

use crate::queue::QueueEntry;
use crate::types::Params;

/// ### 修改记录 (2026-03-05)
/// - 原因: 需要表达重放判定结果
/// - 目的: 驱动执行/丢弃分支
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayDecision {
    /// Execute the entry against its target.
    Replay,
    /// The entry is judged superseded; delete it without executing.
    SkipStale,
}

/// Facts the policy decides on.
#[derive(Debug, Clone, Copy)]
pub struct ReplayContext<'a> {
    pub entry: &'a QueueEntry,
    /// Every other remote has been Up without interruption since the entry was queued.
    pub peers_continuously_up: bool,
}

/// ### 修改记录 (2026-03-05)
/// - 原因: 需要陈旧判定策略接口
/// - 目的: 应用可替换默认的字段嗅探
pub trait ReplayPolicy: Send + Sync {
    fn decide(&self, ctx: ReplayContext<'_>) -> ReplayDecision;
}

/// Default staleness guard.
///
/// A statement counts as timestamped when one of the marker names appears
/// among the named parameter keys or anywhere in the query text. Untimestamped
/// writes are dropped when the peers stayed healthy the whole time, since the
/// peers already hold the latest state and a blind replay would overwrite it.
#[derive(Debug, Clone)]
pub struct TimestampSniffPolicy {
    markers: Vec<String>,
}

impl TimestampSniffPolicy {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().to_ascii_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn is_timestamped(&self, query: &str, params: &Params) -> bool {
        let keys_hit = params.keys().iter().any(|key| {
            let key = key.trim_start_matches(':').to_ascii_lowercase();
            self.markers.iter().any(|m| key.contains(m.as_str()))
        });
        if keys_hit {
            return true;
        }
        let text = query.to_ascii_lowercase();
        self.markers.iter().any(|m| text.contains(m.as_str()))
    }
}

impl ReplayPolicy for TimestampSniffPolicy {
    fn decide(&self, ctx: ReplayContext<'_>) -> ReplayDecision {
        if ctx.peers_continuously_up
            && !self.is_timestamped(&ctx.entry.operation, &ctx.entry.params)
        {
            return ReplayDecision::SkipStale;
        }
        ReplayDecision::Replay
    }
}

/// Replays everything; used when the staleness guard is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReplay;

impl ReplayPolicy for AlwaysReplay {
    fn decide(&self, _ctx: ReplayContext<'_>) -> ReplayDecision {
        ReplayDecision::Replay
    }
}
