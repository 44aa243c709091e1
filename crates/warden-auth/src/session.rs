//! 세션 관리.
//!
//! 세션 ID는 유효한 서명과 함께 세션을 사칭하는 데 필요한 유일한 능력이므로
//! 256 bit CSPRNG 값을 사용합니다.
//!
//! 상태: Active(`now < expires_at`) → Expired(다음 `validate` 또는 정리 작업에서
//! 삭제) → Absent.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use warden_core::SharedClock;

use crate::events::{SecurityEvent, SharedEventSink, TracingEventSink};
use crate::gate::{Identity, Principal};
use crate::opaque;
use crate::store::{MemoryStore, SharedStore};

/// 요청 클라이언트 정보.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// 클라이언트 IP
    pub ip: Option<String>,
    /// User-Agent
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// IP와 User-Agent로 생성.
    pub fn new(ip: Option<String>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }

    /// IP만으로 생성.
    pub fn from_ip(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            user_agent: None,
        }
    }

    /// User-Agent 지정.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// 인증 세션.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// 세션 ID (64자 hex)
    pub id: String,
    /// 사용자 신원 스냅샷
    #[serde(flatten)]
    pub identity: Identity,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 만료 시각
    pub expires_at: DateTime<Utc>,
    /// 마지막 활동 시각
    pub last_activity: DateTime<Utc>,
    /// 마지막 요청 IP
    pub ip_address: Option<String>,
    /// 마지막 요청 User-Agent
    pub user_agent: Option<String>,
}

impl Session {
    /// `now` 시점에 활성 상태인지 여부.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// 인증 주체로 변환.
    pub fn principal(&self) -> Principal {
        Principal {
            identity: self.identity.clone(),
            session_id: self.id.clone(),
        }
    }
}

/// 세션 관리자.
#[derive(Clone)]
pub struct SessionManager {
    ttl: Duration,
    store: SharedStore<Session>,
    clock: SharedClock,
    events: SharedEventSink,
}

impl SessionManager {
    /// 인메모리 저장소로 생성.
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            ttl,
            store: MemoryStore::shared(),
            clock,
            events: TracingEventSink::shared(),
        }
    }

    /// 저장소 교체.
    pub fn with_store(mut self, store: SharedStore<Session>) -> Self {
        self.store = store;
        self
    }

    /// 이벤트 싱크 교체.
    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    /// 세션 TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 새 세션 생성.
    pub fn create(&self, identity: &Identity, client: ClientInfo) -> Session {
        let now = self.clock.now();
        let session = Session {
            id: opaque::generate_session_id(),
            identity: identity.clone(),
            created_at: now,
            expires_at: now + self.ttl,
            last_activity: now,
            ip_address: client.ip,
            user_agent: client.user_agent,
        };

        self.store.insert(session.id.clone(), session.clone());
        tracing::info!(
            user_id = %identity.user_id,
            username = %identity.username,
            "Session created"
        );
        session
    }

    /// 세션 검증.
    ///
    /// 활성 세션이면 `last_activity`를 갱신한 복사본을 반환합니다. 만료된
    /// 세션은 삭제하고 `None`을 반환하며 어떤 필드도 수정하지 않습니다.
    pub fn validate(&self, session_id: &str) -> Option<Session> {
        self.touch(session_id, None)
    }

    /// 세션 검증 후 클라이언트 정보까지 갱신.
    pub fn validate_with_client(&self, session_id: &str, client: &ClientInfo) -> Option<Session> {
        self.touch(session_id, Some(client))
    }

    fn touch(&self, session_id: &str, client: Option<&ClientInfo>) -> Option<Session> {
        let now = self.clock.now();
        let mut found = None;
        let mut expired = false;

        self.store.update(session_id, &mut |current| {
            let mut session = current?;
            if !session.is_active(now) {
                expired = true;
                return None;
            }

            session.last_activity = now;
            if let Some(client) = client {
                if client.ip.is_some() {
                    session.ip_address = client.ip.clone();
                }
                if client.user_agent.is_some() {
                    session.user_agent = client.user_agent.clone();
                }
            }
            found = Some(session.clone());
            Some(session)
        });

        if expired {
            tracing::info!(session_id = %opaque::redact(session_id), "Session expired");
        }
        found
    }

    /// 세션 조회 (갱신 없음).
    pub fn peek(&self, session_id: &str) -> Option<Session> {
        let now = self.clock.now();
        self.store
            .get(session_id)
            .filter(|session| session.is_active(now))
    }

    /// 세션 폐기. 폐기된 활성 세션을 반환합니다.
    ///
    /// 이미 만료된 세션은 삭제만 하고 `None`을 반환합니다.
    pub fn revoke(&self, session_id: &str) -> Option<Session> {
        let now = self.clock.now();
        let mut revoked = None;
        self.store.update(session_id, &mut |current| {
            revoked = current.filter(|session| session.is_active(now));
            None
        });

        let session = revoked?;
        tracing::info!(
            user_id = %session.identity.user_id,
            session_id = %opaque::redact(session_id),
            "Session revoked"
        );
        self.events.record(&SecurityEvent::SessionRevoked {
            session_id: opaque::redact(session_id),
            user_id: session.identity.user_id.clone(),
        });
        Some(session)
    }

    /// 사용자의 모든 세션 폐기.
    pub fn revoke_all_for_user(&self, user_id: &str) -> usize {
        let owned = self
            .store
            .collect(&mut |_, session| session.identity.user_id == user_id);

        owned
            .into_iter()
            .filter(|(id, _)| self.revoke(id).is_some())
            .count()
    }

    /// 활성 세션 수.
    pub fn active_count(&self) -> usize {
        let now = self.clock.now();
        self.store
            .collect(&mut |_, session| session.is_active(now))
            .len()
    }

    /// 저장된 세션 수 (만료 포함).
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// 저장된 세션이 없는지 여부.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// 만료 세션 정리.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let removed = self.store.retain(&mut |_, session| session.is_active(now));
        if removed > 0 {
            tracing::debug!(removed = removed, "Swept expired sessions");
        }
        removed
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("ttl", &self.ttl)
            .field("sessions", &self.store.len())
            .finish()
    }
}
