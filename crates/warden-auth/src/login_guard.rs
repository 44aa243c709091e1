//! 로그인 시도 제한.
//!
//! 식별자별 연속 실패 횟수를 세고 한도에 도달하면 잠급니다.
//!
//! ```text
//! Clear ──실패──▶ Accumulating(1..max-1) ──실패──▶ Locked(>=max)
//!   ▲                    │                            │
//!   └──── 성공 / reset_time 경과 ◀─────────────────────┘
//! ```
//!
//! 실패할 때마다 `reset_time`이 `now + lockout_duration`으로 다시 밀립니다
//! (잠금 중의 실패 포함). 성공은 잠금 중이라도 기록을 지우지만, 잠금 확인이
//! 자격 증명 검증보다 먼저 수행되므로 잠긴 호출자는 검증 단계에 도달하지
//! 못합니다.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use warden_core::{LockoutConfig, SharedClock};

use crate::error::{AuthError, AuthResult};
use crate::events::{SecurityEvent, SharedEventSink, TracingEventSink};
use crate::rate_limit::seconds_until;
use crate::store::{MemoryStore, SharedStore};

/// 식별자별 실패 기록.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttemptRecord {
    /// 식별자 (사용자명)
    pub identifier: String,
    /// 연속 실패 횟수
    pub count: u32,
    /// 기록 만료 시각
    pub reset_time: DateTime<Utc>,
}

/// 로그인 가능 여부.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttemptStatus {
    /// 시도 허용 여부
    pub allowed: bool,
    /// 잠금까지 남은 실패 허용 횟수
    pub remaining: u32,
    /// 잠금 해제 시각 (잠긴 경우)
    pub reset_time: Option<DateTime<Utc>>,
    /// 잠금 해제까지 남은 시간 (초)
    pub retry_after: Option<u64>,
}

impl LoginAttemptStatus {
    fn clear(max: u32) -> Self {
        Self {
            allowed: true,
            remaining: max,
            reset_time: None,
            retry_after: None,
        }
    }

    /// 잠긴 경우 [`AuthError::AccountLocked`]로 변환.
    pub fn into_result(self) -> AuthResult<Self> {
        match self.retry_after {
            Some(retry_after) if !self.allowed => Err(AuthError::AccountLocked { retry_after }),
            _ => Ok(self),
        }
    }
}

/// 로그인 시도 관리자.
#[derive(Clone)]
pub struct LoginAttemptGuard {
    config: LockoutConfig,
    store: SharedStore<LoginAttemptRecord>,
    clock: SharedClock,
    events: SharedEventSink,
}

impl LoginAttemptGuard {
    /// 인메모리 저장소로 생성.
    pub fn new(config: LockoutConfig, clock: SharedClock) -> Self {
        Self {
            config,
            store: MemoryStore::shared(),
            clock,
            events: TracingEventSink::shared(),
        }
    }

    /// 저장소 교체.
    pub fn with_store(mut self, store: SharedStore<LoginAttemptRecord>) -> Self {
        self.store = store;
        self
    }

    /// 이벤트 싱크 교체.
    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    /// 로그인 시도 가능 여부 확인.
    ///
    /// 만료된 기록은 이 시점에 삭제됩니다.
    pub fn check(&self, identifier: &str) -> LoginAttemptStatus {
        let max = self.config.max_login_attempts;
        let now = self.clock.now();
        let mut status = LoginAttemptStatus::clear(max);

        self.store.update(identifier, &mut |current| match current {
            Some(record) if now < record.reset_time => {
                status = if record.count >= max {
                    LoginAttemptStatus {
                        allowed: false,
                        remaining: 0,
                        reset_time: Some(record.reset_time),
                        retry_after: Some(seconds_until(record.reset_time, now)),
                    }
                } else {
                    LoginAttemptStatus::clear(max - record.count)
                };
                Some(record)
            }
            _ => None,
        });

        status
    }

    /// 로그인 결과 기록.
    ///
    /// 실패 시 갱신된 기록을 반환합니다. 성공 시 기록을 삭제하고 `None`을 반환합니다.
    pub fn record(&self, identifier: &str, success: bool) -> Option<LoginAttemptRecord> {
        if success {
            self.store.remove(identifier);
            counter!("auth_login_attempts_total", "status" => "success").increment(1);
            tracing::info!(identifier = %identifier, "Successful login");
            return None;
        }

        let now = self.clock.now();
        let lockout = self.config.lockout_duration();
        let mut updated = None;

        self.store.update(identifier, &mut |current| {
            let mut record = match current {
                Some(record) if now < record.reset_time => record,
                _ => LoginAttemptRecord {
                    identifier: identifier.to_string(),
                    count: 0,
                    reset_time: now,
                },
            };
            record.count = record.count.saturating_add(1);
            record.reset_time = now + lockout;
            updated = Some(record.clone());
            Some(record)
        });

        counter!("auth_login_attempts_total", "status" => "failure").increment(1);

        let record = updated?;
        let max = self.config.max_login_attempts;
        tracing::warn!(
            identifier = %identifier,
            attempts = record.count,
            max_attempts = max,
            "Failed login attempt"
        );

        if record.count >= max {
            let retry_after = seconds_until(record.reset_time, now);
            tracing::error!(
                identifier = %identifier,
                until = %record.reset_time.to_rfc3339(),
                "Account locked"
            );
            self.events.record(&SecurityEvent::AccountLocked {
                identifier: identifier.to_string(),
                attempts: record.count,
                retry_after,
            });
        }

        Some(record)
    }

    /// 현재 기록 조회 (만료 여부와 무관).
    pub fn peek(&self, identifier: &str) -> Option<LoginAttemptRecord> {
        self.store.get(identifier)
    }

    /// 만료된 기록 정리.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let removed = self.store.retain(&mut |_, record| now < record.reset_time);
        if removed > 0 {
            tracing::debug!(removed = removed, "Swept expired login attempt records");
        }
        removed
    }

    /// 추적 중인 식별자 수.
    pub fn tracked(&self) -> usize {
        self.store.len()
    }
}

impl std::fmt::Debug for LoginAttemptGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginAttemptGuard")
            .field("config", &self.config)
            .field("tracked", &self.store.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use chrono::Duration;
    use warden_core::ManualClock;

    use crate::events::MemoryEventSink;

    fn guard(clock: &Arc<ManualClock>) -> LoginAttemptGuard {
        LoginAttemptGuard::new(LockoutConfig::default(), clock.clone())
    }

    #[test]
    fn test_locks_after_max_failures() {
        let clock = Arc::new(ManualClock::starting_now());
        let guard = guard(&clock);

        for attempt in 1..=5u32 {
            let status = guard.check("alice");
            assert!(status.allowed);
            assert_eq!(status.remaining, 6 - attempt);
            guard.record("alice", false);
        }

        let status = guard.check("alice");
        assert!(!status.allowed);
        assert_eq!(status.retry_after, Some(900));
        assert_matches!(
            status.into_result(),
            Err(AuthError::AccountLocked { retry_after: 900 })
        );
    }

    #[test]
    fn test_failure_during_lockout_extends_window() {
        let clock = Arc::new(ManualClock::starting_now());
        let guard = guard(&clock);

        for _ in 0..5 {
            guard.record("alice", false);
        }
        clock.advance(Duration::minutes(10));
        let record = guard.record("alice", false).unwrap();
        assert_eq!(record.count, 6);
        assert_eq!(guard.check("alice").retry_after, Some(900));
    }

    #[test]
    fn test_success_clears_even_mid_lockout() {
        let clock = Arc::new(ManualClock::starting_now());
        let guard = guard(&clock);

        for _ in 0..5 {
            guard.record("alice", false);
        }
        assert!(!guard.check("alice").allowed);

        assert!(guard.record("alice", true).is_none());
        let status = guard.check("alice");
        assert!(status.allowed);
        assert_eq!(status.remaining, 5);
        assert!(guard.peek("alice").is_none());
    }

    #[test]
    fn test_elapsed_record_returns_to_clear() {
        let clock = Arc::new(ManualClock::starting_now());
        let guard = guard(&clock);

        for _ in 0..5 {
            guard.record("alice", false);
        }
        clock.advance(Duration::minutes(15));

        assert!(guard.check("alice").allowed);
        assert!(guard.peek("alice").is_none());

        // 새 실패는 1부터 다시 셈
        assert_eq!(guard.record("alice", false).unwrap().count, 1);
    }

    #[test]
    fn test_lockout_emits_event_and_sweep() {
        let clock = Arc::new(ManualClock::starting_now());
        let sink = Arc::new(MemoryEventSink::new());
        let guard = guard(&clock).with_events(sink.clone());

        for _ in 0..5 {
            guard.record("alice", false);
        }
        guard.record("bob", false);
        assert_eq!(sink.count("account_locked"), 1);
        assert_eq!(guard.tracked(), 2);

        clock.advance(Duration::minutes(16));
        assert_eq!(guard.sweep(), 2);
        assert_eq!(guard.tracked(), 0);
    }

    #[test]
    fn test_concurrent_failures_are_not_lost() {
        let clock = Arc::new(ManualClock::starting_now());
        let guard = Arc::new(guard(&clock));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let guard = Arc::clone(&guard);
                scope.spawn(move || {
                    for _ in 0..25 {
                        guard.record("mallory", false);
                    }
                });
            }
        });

        assert_eq!(guard.peek("mallory").unwrap().count, 100);
    }
}
