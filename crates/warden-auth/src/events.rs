//! 보안 이벤트.
//!
//! 잠금, 폐기, 반복된 한도 위반 같은 보안 관련 사건을 외부에서 관찰할 수
//! 있도록 [`SecurityEventSink`]로 내보냅니다. 싱크는 값을 반환하지 않으며
//! 인증 결과는 싱크 동작과 무관합니다.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use warden_core::{SharedClock, SystemClock};

use crate::rate_limit::RateLimitCategory;

/// 이벤트 심각도.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 정상 흐름
    Info,
    /// 실패/거부
    Warning,
    /// 침해 의심
    Critical,
}

/// Refresh Token 폐기 사유.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    /// 로그아웃
    Logout,
    /// 사용 시 교체
    Rotated,
    /// 명시적 폐기 요청
    Explicit,
    /// 사용자당 최대 개수 초과로 가장 오래된 토큰 제거
    Evicted,
}

impl RevocationReason {
    /// 메트릭 라벨 / 로그용 이름.
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::Logout => "logout",
            RevocationReason::Rotated => "rotated",
            RevocationReason::Explicit => "explicit",
            RevocationReason::Evicted => "evicted",
        }
    }
}

impl std::fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 보안 이벤트.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecurityEvent {
    /// 로그인 성공
    LoginSucceeded {
        user_id: String,
        username: String,
        session_id: String,
        ip: Option<String>,
    },
    /// 로그인 실패 (계정 없음/비밀번호 불일치 구분 없음)
    LoginFailed {
        identifier: String,
        ip: Option<String>,
        attempts: u32,
    },
    /// 실패 누적으로 잠금 진입
    AccountLocked {
        identifier: String,
        attempts: u32,
        retry_after: u64,
    },
    /// 잠금 중 로그인 시도
    LockedAttempt { identifier: String, retry_after: u64 },
    /// 요청 한도 초과
    RateLimitExceeded {
        category: RateLimitCategory,
        identifier: String,
        retry_after: u64,
    },
    /// 세션 폐기
    SessionRevoked { session_id: String, user_id: String },
    /// Refresh Token 폐기 (토큰 값은 가려진 형태만 기록)
    RefreshTokenRevoked {
        user_id: String,
        token_preview: String,
        reason: RevocationReason,
    },
    /// 서명은 유효하지만 이미 교체/폐기된 Refresh Token 제출
    RefreshTokenReuse { user_id: String },
    /// 권한/역할 거부
    PermissionDenied { username: String, requirement: String },
}

impl SecurityEvent {
    /// 이벤트 심각도.
    pub fn severity(&self) -> Severity {
        match self {
            SecurityEvent::LoginSucceeded { .. } | SecurityEvent::SessionRevoked { .. } => {
                Severity::Info
            }
            SecurityEvent::RefreshTokenRevoked { reason, .. } => match reason {
                RevocationReason::Rotated | RevocationReason::Logout => Severity::Info,
                RevocationReason::Explicit | RevocationReason::Evicted => Severity::Warning,
            },
            SecurityEvent::LoginFailed { .. }
            | SecurityEvent::LockedAttempt { .. }
            | SecurityEvent::RateLimitExceeded { .. }
            | SecurityEvent::PermissionDenied { .. } => Severity::Warning,
            SecurityEvent::AccountLocked { .. } | SecurityEvent::RefreshTokenReuse { .. } => {
                Severity::Critical
            }
        }
    }

    /// 이벤트 이름 (snake_case).
    pub fn name(&self) -> &'static str {
        match self {
            SecurityEvent::LoginSucceeded { .. } => "login_succeeded",
            SecurityEvent::LoginFailed { .. } => "login_failed",
            SecurityEvent::AccountLocked { .. } => "account_locked",
            SecurityEvent::LockedAttempt { .. } => "locked_attempt",
            SecurityEvent::RateLimitExceeded { .. } => "rate_limit_exceeded",
            SecurityEvent::SessionRevoked { .. } => "session_revoked",
            SecurityEvent::RefreshTokenRevoked { .. } => "refresh_token_revoked",
            SecurityEvent::RefreshTokenReuse { .. } => "refresh_token_reuse",
            SecurityEvent::PermissionDenied { .. } => "permission_denied",
        }
    }
}

/// 보안 이벤트 수신자.
pub trait SecurityEventSink: Send + Sync {
    /// 이벤트 기록.
    fn record(&self, event: &SecurityEvent);
}

/// 공유 싱크 핸들.
pub type SharedEventSink = Arc<dyn SecurityEventSink>;

/// tracing으로 이벤트를 내보내는 기본 싱크.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl TracingEventSink {
    /// 공유 핸들로 생성.
    pub fn shared() -> SharedEventSink {
        Arc::new(TracingEventSink)
    }
}

impl SecurityEventSink for TracingEventSink {
    fn record(&self, event: &SecurityEvent) {
        let name = event.name();
        match event.severity() {
            Severity::Info => tracing::info!(target: "warden::security", event = name, detail = ?event, "Security event"),
            Severity::Warning => tracing::warn!(target: "warden::security", event = name, detail = ?event, "Security event"),
            Severity::Critical => tracing::error!(target: "warden::security", event = name, detail = ?event, "Security event"),
        }
    }
}

/// 기록된 이벤트.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    /// 이벤트 ID
    pub id: Uuid,
    /// 기록 시각
    pub at: DateTime<Utc>,
    /// 이벤트 내용
    pub event: SecurityEvent,
}

/// 메모리에 이벤트를 모으는 싱크.
///
/// 기록 시각은 주입된 시계에서 가져옵니다.
#[derive(Debug)]
pub struct MemoryEventSink {
    events: RwLock<Vec<RecordedEvent>>,
    clock: SharedClock,
}

impl MemoryEventSink {
    /// 시스템 시계를 쓰는 빈 싱크 생성.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    /// 지정한 시계를 쓰는 빈 싱크 생성.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            clock,
        }
    }

    /// 기록된 이벤트 복사본.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 이름이 일치하는 이벤트 수.
    pub fn count(&self, name: &str) -> usize {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|recorded| recorded.event.name() == name)
            .count()
    }

    /// 기록 초기화.
    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for MemoryEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityEventSink for MemoryEventSink {
    fn record(&self, event: &SecurityEvent) {
        let recorded = RecordedEvent {
            id: Uuid::new_v4(),
            at: self.clock.now(),
            event: event.clone(),
        };
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(recorded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::Clock;

    #[test]
    fn test_severity_mapping() {
        let locked = SecurityEvent::AccountLocked {
            identifier: "alice".into(),
            attempts: 5,
            retry_after: 900,
        };
        assert_eq!(locked.severity(), Severity::Critical);

        let rotated = SecurityEvent::RefreshTokenRevoked {
            user_id: "u1".into(),
            token_preview: "abcd...".into(),
            reason: RevocationReason::Rotated,
        };
        assert_eq!(rotated.severity(), Severity::Info);

        let limited = SecurityEvent::RateLimitExceeded {
            category: RateLimitCategory::Auth,
            identifier: "10.0.0.1".into(),
            retry_after: 3,
        };
        assert_eq!(limited.severity(), Severity::Warning);
    }

    #[test]
    fn test_memory_sink_records() {
        let sink = MemoryEventSink::new();
        sink.record(&SecurityEvent::RefreshTokenReuse {
            user_id: "u1".into(),
        });
        sink.record(&SecurityEvent::LockedAttempt {
            identifier: "alice".into(),
            retry_after: 10,
        });

        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.count("refresh_token_reuse"), 1);

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_memory_sink_uses_injected_clock() {
        let clock = Arc::new(warden_core::ManualClock::starting_now());
        let sink = MemoryEventSink::with_clock(clock.clone());
        clock.advance(chrono::Duration::hours(3));
        sink.record(&SecurityEvent::RefreshTokenReuse {
            user_id: "u1".into(),
        });

        assert_eq!(sink.events()[0].at, clock.now());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = SecurityEvent::SessionRevoked {
            session_id: "s1".into(),
            user_id: "u1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session_revoked");
        assert_eq!(json["session_id"], "s1");
    }
}
