//! 요청 한도 (Rate Limiting).
//!
//! 키(`카테고리:식별자`)별로 윈도우 안의 요청 시각을 기록합니다.
//!
//! `reset_time`은 키가 처음 생성될 때 `now + window`로 고정되고 요청마다
//! 다시 계산하지 않습니다. 즉 첫 요청에 고정된 윈도우이며, 윈도우 경계에서
//! 몰리는 요청은 진짜 슬라이딩 윈도우보다 덜 제한됩니다.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use warden_core::{RateLimitConfig, SharedClock, WindowLimit};

use crate::error::{AuthError, AuthResult};
use crate::events::{SecurityEvent, SharedEventSink, TracingEventSink};
use crate::store::{MemoryStore, SharedStore};

/// 요청 한도 카테고리.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitCategory {
    /// 일반 API 요청
    General,
    /// 로그인
    Auth,
    /// 토큰 갱신
    Refresh,
}

impl RateLimitCategory {
    /// 저장소 키 접두사.
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitCategory::General => "general",
            RateLimitCategory::Auth => "auth",
            RateLimitCategory::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for RateLimitCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 키별 요청 윈도우.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitWindow {
    /// 윈도우 안의 요청 시각 (오름차순)
    pub requests: Vec<DateTime<Utc>>,
    /// 윈도우 종료 시각 (키 생성 시 고정)
    pub reset_time: DateTime<Utc>,
}

impl RateLimitWindow {
    fn new(reset_time: DateTime<Utc>) -> Self {
        Self {
            requests: Vec::new(),
            reset_time,
        }
    }
}

/// 한도 확인 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// 허용 여부
    pub allowed: bool,
    /// 윈도우 안에서 남은 요청 수
    pub remaining: usize,
    /// 윈도우 종료 시각
    pub reset_time: DateTime<Utc>,
    /// 거부 시 재시도까지 대기 시간 (초, 최소 1)
    pub retry_after: Option<u64>,
}

impl RateLimitDecision {
    /// 거부된 경우 [`AuthError::RateLimited`]로 변환.
    pub fn into_result(self) -> AuthResult<Self> {
        match self.retry_after {
            Some(retry_after) if !self.allowed => Err(AuthError::RateLimited { retry_after }),
            _ => Ok(self),
        }
    }
}

/// 남은 시간을 올림한 초 단위로 변환 (최소 1초).
pub(crate) fn seconds_until(until: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (until - now).num_milliseconds().max(0);
    let secs = (millis + 999) / 1000;
    secs.max(1) as u64
}

/// 카테고리별 요청 한도 관리자.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    store: SharedStore<RateLimitWindow>,
    clock: SharedClock,
    events: SharedEventSink,
}

impl RateLimiter {
    /// 인메모리 저장소로 생성.
    pub fn new(config: RateLimitConfig, clock: SharedClock) -> Self {
        Self {
            config,
            store: MemoryStore::shared(),
            clock,
            events: TracingEventSink::shared(),
        }
    }

    /// 저장소 교체.
    pub fn with_store(mut self, store: SharedStore<RateLimitWindow>) -> Self {
        self.store = store;
        self
    }

    /// 이벤트 싱크 교체.
    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    /// 카테고리의 한도.
    pub fn limit_for(&self, category: RateLimitCategory) -> WindowLimit {
        match category {
            RateLimitCategory::General => self.config.general,
            RateLimitCategory::Auth => self.config.auth,
            RateLimitCategory::Refresh => self.config.refresh,
        }
    }

    /// 저장소 키.
    pub fn key(identifier: &str, category: RateLimitCategory) -> String {
        format!("{}:{}", category, identifier)
    }

    /// 요청 허용 여부 확인 및 기록.
    pub fn check(&self, identifier: &str, category: RateLimitCategory) -> RateLimitDecision {
        let limit = self.limit_for(category);
        let window = limit.window();
        let key = Self::key(identifier, category);
        let now = self.clock.now();

        // 클로저가 실행되지 않는 저장소 구현에서는 거부로 처리
        let mut decision = RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_time: now,
            retry_after: Some(1),
        };

        self.store.update(&key, &mut |current| {
            let mut state = match current {
                Some(state) if now < state.reset_time => state,
                // 윈도우가 지난 키는 정리된 것과 동일하게 취급
                _ => RateLimitWindow::new(now + window),
            };
            state.requests.retain(|at| now - *at < window);

            if state.requests.len() >= limit.max_requests {
                decision = RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset_time: state.reset_time,
                    retry_after: Some(seconds_until(state.reset_time, now)),
                };
            } else {
                state.requests.push(now);
                decision = RateLimitDecision {
                    allowed: true,
                    remaining: limit.max_requests - state.requests.len(),
                    reset_time: state.reset_time,
                    retry_after: None,
                };
            }
            Some(state)
        });

        if decision.allowed {
            counter!("auth_rate_limit_total", "category" => category.as_str(), "status" => "allowed")
                .increment(1);
        } else {
            counter!("auth_rate_limit_total", "category" => category.as_str(), "status" => "limited")
                .increment(1);

            let retry_after = decision.retry_after.unwrap_or(1);
            tracing::warn!(
                category = %category,
                identifier = %identifier,
                retry_after = retry_after,
                "Rate limit exceeded"
            );
            self.events.record(&SecurityEvent::RateLimitExceeded {
                category,
                identifier: identifier.to_string(),
                retry_after,
            });
        }

        decision
    }

    /// 윈도우가 끝난 키 정리.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let removed = self.store.retain(&mut |_, state| now < state.reset_time);
        if removed > 0 {
            tracing::debug!(removed = removed, "Swept expired rate limit windows");
        }
        removed
    }

    /// 현재 추적 중인 키 수.
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("tracked_keys", &self.store.len())
            .finish()
    }
}
