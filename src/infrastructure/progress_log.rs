//! 进度日志 - 基础设施层
//!
//! 每个任务一条只追加的事件序列，容量有上限（先进先出淘汰）。
//! 轮询（`read_since`）和推送订阅（`subscribe`）可以同时读同一个任务，
//! 读操作只在复制事件时短暂持有分片锁，不会阻塞其他任务的写入。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, Stream};
use tracing::debug;

use crate::models::progress::{ProgressEvent, ProgressStage, StreamItem};

struct JobLog<S> {
    events: VecDeque<ProgressEvent<S>>,
    last_timestamp: i64,
}

/// 按任务 ID 划分的进度日志
pub struct ProgressLog<S> {
    jobs: DashMap<String, JobLog<S>>,
    max_events: usize,
}

impl<S: ProgressStage> ProgressLog<S> {
    pub fn new(max_events: usize) -> Self {
        Self {
            jobs: DashMap::new(),
            max_events: max_events.max(1),
        }
    }

    /// 创建任务；已存在时不做任何事
    pub fn create_job(&self, job_id: &str) {
        self.jobs.entry(job_id.to_string()).or_insert_with(|| JobLog {
            events: VecDeque::new(),
            last_timestamp: 0,
        });
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    /// 追加事件，返回赋予的时间戳
    ///
    /// 未知任务直接丢弃事件并返回 `None`，从不报错。
    pub fn append(&self, job_id: &str, mut event: ProgressEvent<S>) -> Option<i64> {
        let mut log = match self.jobs.get_mut(job_id) {
            Some(log) => log,
            None => {
                debug!("丢弃未知任务 {} 的进度事件: {}", job_id, event.message);
                return None;
            }
        };

        let now = Utc::now().timestamp_millis();
        let timestamp = now.max(log.last_timestamp + 1);
        event.timestamp = timestamp;
        log.last_timestamp = timestamp;
        log.events.push_back(event);

        while log.events.len() > self.max_events {
            evict_oldest(&mut log.events);
        }

        Some(timestamp)
    }

    /// 读取事件：不带时间戳时返回全部，否则只返回严格更新的事件
    pub fn read_since(&self, job_id: &str, since: Option<i64>) -> Vec<ProgressEvent<S>> {
        match self.jobs.get(job_id) {
            Some(log) => log
                .events
                .iter()
                .filter(|e| since.map_or(true, |ts| e.timestamp > ts))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// 最近的一条终止事件
    pub fn terminal_event(&self, job_id: &str) -> Option<ProgressEvent<S>> {
        self.jobs
            .get(job_id)
            .and_then(|log| log.events.iter().rev().find(|e| e.is_terminal()).cloned())
    }

    /// 立即删除任务的全部历史
    pub fn discard(&self, job_id: &str) {
        self.jobs.remove(job_id);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// 推送订阅：定期重读日志，空闲时发心跳，送出终止事件后结束。
    /// 任务被丢弃时流也会结束。
    pub fn subscribe(
        self: &Arc<Self>,
        job_id: &str,
        poll_interval: Duration,
        heartbeat_interval: Duration,
    ) -> impl Stream<Item = StreamItem<S>> + Send + 'static {
        let state = SubscriptionState {
            log: Arc::clone(self),
            job_id: job_id.to_string(),
            since: None,
            pending: VecDeque::new(),
            finished: false,
            last_activity: Instant::now(),
            poll_interval,
            heartbeat_interval,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((StreamItem::Event(event), state));
                }
                if state.finished || !state.log.contains(&state.job_id) {
                    return None;
                }

                let fresh = state.log.read_since(&state.job_id, state.since);
                if !fresh.is_empty() {
                    state.since = fresh.last().map(|e| e.timestamp);
                    state.finished = fresh.iter().any(|e| e.is_terminal());
                    state.pending.extend(fresh);
                    state.last_activity = Instant::now();
                    continue;
                }

                if state.last_activity.elapsed() >= state.heartbeat_interval {
                    state.last_activity = Instant::now();
                    let heartbeat = StreamItem::Heartbeat {
                        timestamp: Utc::now().timestamp_millis(),
                    };
                    return Some((heartbeat, state));
                }

                tokio::time::sleep(state.poll_interval).await;
            }
        })
    }
}

struct SubscriptionState<S> {
    log: Arc<ProgressLog<S>>,
    job_id: String,
    since: Option<i64>,
    pending: VecDeque<ProgressEvent<S>>,
    finished: bool,
    last_activity: Instant,
    poll_interval: Duration,
    heartbeat_interval: Duration,
}

/// 淘汰最旧的事件，但保留最近一条终止事件
fn evict_oldest<S: ProgressStage>(events: &mut VecDeque<ProgressEvent<S>>) {
    let last_terminal = events.iter().rposition(|e| e.is_terminal());
    let victim = match last_terminal {
        Some(0) if events.len() > 1 => 1,
        _ => 0,
    };
    events.remove(victim);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::progress::ExtractionStage;
    use futures::StreamExt;

    fn event(stage: ExtractionStage, msg: &str) -> ProgressEvent<ExtractionStage> {
        ProgressEvent::new(stage, msg)
    }

    #[test]
    fn test_append_to_unknown_job_is_dropped() {
        let log = ProgressLog::new(10);
        assert_eq!(log.append("nope", event(ExtractionStage::Received, "x")), None);
        assert!(log.read_since("nope", None).is_empty());
    }

    #[test]
    fn test_create_job_is_idempotent() {
        let log = ProgressLog::new(10);
        log.create_job("j1");
        log.append("j1", event(ExtractionStage::Received, "a"));
        log.create_job("j1");
        assert_eq!(log.read_since("j1", None).len(), 1);
    }

    #[test]
    fn test_read_since_is_strictly_newer() {
        let log = ProgressLog::new(10);
        log.create_job("j1");
        let t1 = log.append("j1", event(ExtractionStage::Received, "a")).unwrap();
        let t2 = log.append("j1", event(ExtractionStage::CallingAi, "b")).unwrap();
        let t3 = log.append("j1", event(ExtractionStage::Done, "c")).unwrap();

        // 同一毫秒内追加的事件也必须有不同的时间戳
        assert!(t1 < t2 && t2 < t3);
        let newer = log.read_since("j1", Some(t1));
        assert_eq!(newer.len(), 2);
        assert_eq!(newer[0].message, "b");
        assert!(log.read_since("j1", Some(t3)).is_empty());
    }

    #[test]
    fn test_cap_evicts_oldest_first() {
        let log = ProgressLog::new(3);
        log.create_job("j1");
        for i in 0..5 {
            log.append("j1", event(ExtractionStage::CallingAi, &format!("e{}", i)));
        }
        let msgs: Vec<String> = log.read_since("j1", None).into_iter().map(|e| e.message).collect();
        assert_eq!(msgs, vec!["e2", "e3", "e4"]);
    }

    #[test]
    fn test_cap_keeps_latest_terminal_event() {
        let log = ProgressLog::new(2);
        log.create_job("j1");
        log.append("j1", event(ExtractionStage::Done, "done"));
        log.append("j1", event(ExtractionStage::CallingAi, "late-1"));
        log.append("j1", event(ExtractionStage::CallingAi, "late-2"));

        let msgs: Vec<String> = log.read_since("j1", None).into_iter().map(|e| e.message).collect();
        assert_eq!(msgs, vec!["done", "late-2"]);
        assert_eq!(log.terminal_event("j1").unwrap().message, "done");
    }

    #[test]
    fn test_discard_removes_history() {
        let log = ProgressLog::new(10);
        log.create_job("j1");
        log.create_job("j2");
        log.append("j1", event(ExtractionStage::Received, "a"));
        assert_eq!(log.job_count(), 2);
        log.discard("j1");
        assert!(!log.contains("j1"));
        assert_eq!(log.job_count(), 1);
        assert!(log.read_since("j1", None).is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_ends_after_terminal_event() {
        let log = Arc::new(ProgressLog::new(10));
        log.create_job("j1");

        let writer = Arc::clone(&log);
        tokio::spawn(async move {
            writer.append("j1", event(ExtractionStage::Received, "a"));
            tokio::time::sleep(Duration::from_millis(40)).await;
            writer.append("j1", event(ExtractionStage::Done, "b"));
        });

        let items: Vec<_> = log
            .subscribe("j1", Duration::from_millis(5), Duration::from_millis(15))
            .collect()
            .await;

        let events: Vec<&str> = items
            .iter()
            .filter_map(|item| match item {
                StreamItem::Event(e) => Some(e.message.as_str()),
                StreamItem::Heartbeat { .. } => None,
            })
            .collect();
        assert_eq!(events, vec!["a", "b"]);
        assert!(items.iter().any(|i| matches!(i, StreamItem::Heartbeat { .. })));
    }
}
