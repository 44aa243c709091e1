//! Refresh Token 관리.
//!
//! Refresh Token은 세션과 짝을 이루는 긴 수명의 불투명 토큰입니다. 로테이션이
//! 켜져 있으면 갱신에 사용된 토큰은 [`RefreshTokenManager::consume`]으로 즉시
//! 제거되어 한 번만 사용할 수 있습니다. 교체된 토큰을 다시 제출하면 `validate`와
//! `consume` 모두 `None`을 반환합니다.
//!
//! 교체된 토큰은 원래 만료 시각까지 별도 기록으로 남아
//! [`RefreshTokenManager::was_rotated`]로 재사용 시도를 구분할 수 있습니다.
//!
//! 전체 토큰 값은 발급 시점에만 호출자에게 전달되고, 목록/로그/이벤트에는
//! 앞 16자만 노출합니다.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::SharedClock;

use crate::events::{RevocationReason, SecurityEvent, SharedEventSink, TracingEventSink};
use crate::gate::Identity;
use crate::opaque;
use crate::store::{MemoryStore, SharedStore};

/// 저장된 Refresh Token 정보. 토큰 값 자체는 저장소 키입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRecord {
    /// 목록/폐기용 비밀이 아닌 식별자
    pub id: Uuid,
    /// 사용자 신원 스냅샷
    #[serde(flatten)]
    pub identity: Identity,
    /// 발급 당시 세션 ID (조회 전용 약한 참조)
    pub session_id: String,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 만료 시각
    pub expires_at: DateTime<Utc>,
    /// 마지막 사용 시각
    pub last_used: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// `now` 시점에 유효한지 여부.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// 목록 조회용 요약 (토큰 값은 가려짐).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenSummary {
    /// 토큰 식별자
    pub id: Uuid,
    /// 토큰 앞 16자 + "..."
    pub token_preview: String,
    /// 세션 ID 앞 16자 + "..."
    pub session_preview: String,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 마지막 사용 시각
    pub last_used: DateTime<Utc>,
    /// 만료 시각
    pub expires_at: DateTime<Utc>,
}

/// Refresh Token 관리자.
#[derive(Clone)]
pub struct RefreshTokenManager {
    ttl: Duration,
    max_per_user: usize,
    store: SharedStore<RefreshTokenRecord>,
    /// 교체된 토큰 → 원래 만료 시각
    rotated: SharedStore<DateTime<Utc>>,
    clock: SharedClock,
    events: SharedEventSink,
}

impl RefreshTokenManager {
    /// 인메모리 저장소로 생성.
    pub fn new(ttl: Duration, max_per_user: usize, clock: SharedClock) -> Self {
        Self {
            ttl,
            max_per_user: max_per_user.max(1),
            store: MemoryStore::shared(),
            rotated: MemoryStore::shared(),
            clock,
            events: TracingEventSink::shared(),
        }
    }

    /// 저장소 교체.
    pub fn with_store(mut self, store: SharedStore<RefreshTokenRecord>) -> Self {
        self.store = store;
        self
    }

    /// 이벤트 싱크 교체.
    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    /// 토큰 TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 새 토큰을 생성하고 저장합니다.
    ///
    /// 반환되는 토큰 값은 이후 어떤 조회로도 다시 얻을 수 없습니다.
    pub fn mint(&self, identity: &Identity, session_id: &str) -> (String, RefreshTokenRecord) {
        let token = opaque::generate_refresh_token();
        let record = self.store(&token, identity, session_id);
        (token, record)
    }

    /// 토큰 저장.
    ///
    /// 사용자가 이미 최대 개수의 토큰을 가지고 있으면 가장 오래된 토큰부터
    /// 제거합니다.
    pub fn store(&self, token: &str, identity: &Identity, session_id: &str) -> RefreshTokenRecord {
        let now = self.clock.now();
        self.evict_oldest(&identity.user_id, now);

        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            identity: identity.clone(),
            session_id: session_id.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
            last_used: now,
        };
        self.store.insert(token.to_string(), record.clone());

        tracing::info!(
            user_id = %identity.user_id,
            username = %identity.username,
            "Refresh token stored"
        );
        record
    }

    fn evict_oldest(&self, user_id: &str, now: DateTime<Utc>) {
        let mut owned = self
            .store
            .collect(&mut |_, record| record.identity.user_id == user_id && record.is_active(now));
        if owned.len() < self.max_per_user {
            return;
        }

        owned.sort_by_key(|(_, record)| record.created_at);
        let excess = owned.len() + 1 - self.max_per_user;
        for (token, _) in owned.into_iter().take(excess) {
            self.revoke_with_reason(&token, RevocationReason::Evicted);
        }
    }

    /// 토큰 검증.
    ///
    /// 유효하면 `last_used`를 갱신한 복사본을 반환합니다. 만료된 토큰은 삭제됩니다.
    pub fn validate(&self, token: &str) -> Option<RefreshTokenRecord> {
        let now = self.clock.now();
        let mut found = None;

        self.store.update(token, &mut |current| {
            let mut record = current?;
            if !record.is_active(now) {
                return None;
            }
            record.last_used = now;
            found = Some(record.clone());
            Some(record)
        });

        found
    }

    /// 토큰을 원자적으로 꺼내 소비합니다 (로테이션).
    ///
    /// 동시에 같은 토큰을 제출해도 최대 한 번만 `Some`을 반환합니다.
    /// 소유자가 `owner`가 아니면 토큰을 그대로 두고 `None`을 반환합니다.
    pub fn consume(&self, token: &str, owner: &str) -> Option<RefreshTokenRecord> {
        let now = self.clock.now();
        let mut consumed = None;
        let mut mismatched = false;

        self.store.update(token, &mut |current| {
            let record = current?;
            if !record.is_active(now) {
                return None;
            }
            if record.identity.user_id != owner {
                mismatched = true;
                return Some(record);
            }
            consumed = Some(record);
            None
        });

        if mismatched {
            tracing::warn!(user_id = %owner, "Refresh token owner mismatch");
            return None;
        }

        let mut record = consumed?;
        record.last_used = now;
        self.rotated.insert(token.to_string(), record.expires_at);
        self.revoked(token, &record, RevocationReason::Rotated);
        Some(record)
    }

    /// 로테이션으로 이미 교체된 토큰인지 여부.
    ///
    /// 폐기/만료/축출된 토큰은 `false`입니다.
    pub fn was_rotated(&self, token: &str) -> bool {
        let now = self.clock.now();
        self.rotated
            .get(token)
            .map_or(false, |expires_at| now < expires_at)
    }

    /// 토큰 폐기. 이미 없으면 `false`.
    pub fn revoke(&self, token: &str) -> bool {
        self.revoke_with_reason(token, RevocationReason::Explicit)
    }

    /// 사유를 지정하여 토큰 폐기.
    pub fn revoke_with_reason(&self, token: &str, reason: RevocationReason) -> bool {
        match self.store.remove(token) {
            Some(record) => {
                self.revoked(token, &record, reason);
                true
            }
            None => false,
        }
    }

    /// 식별자로 토큰 폐기.
    ///
    /// `owner`가 주어지면 해당 사용자의 토큰일 때만 폐기합니다.
    pub fn revoke_by_id(&self, id: Uuid, owner: Option<&str>) -> bool {
        let matches = self.store.collect(&mut |_, record| {
            record.id == id && owner.map_or(true, |user_id| record.identity.user_id == user_id)
        });

        matches
            .into_iter()
            .any(|(token, _)| self.revoke_with_reason(&token, RevocationReason::Explicit))
    }

    /// 사용자의 모든 토큰 폐기.
    pub fn revoke_all_for_user(&self, user_id: &str) -> usize {
        self.revoke_all_for_user_with_reason(user_id, RevocationReason::Explicit)
    }

    /// 사유를 지정하여 사용자의 모든 토큰 폐기.
    pub fn revoke_all_for_user_with_reason(&self, user_id: &str, reason: RevocationReason) -> usize {
        let owned = self
            .store
            .collect(&mut |_, record| record.identity.user_id == user_id);

        let revoked = owned
            .into_iter()
            .filter(|(token, _)| self.revoke_with_reason(token, reason))
            .count();

        if revoked > 0 {
            tracing::info!(user_id = %user_id, revoked = revoked, "Revoked refresh tokens for user");
        }
        revoked
    }

    /// 사용자의 활성 토큰 목록 (생성 순).
    pub fn list_active_for_user(&self, user_id: &str) -> Vec<RefreshTokenSummary> {
        let now = self.clock.now();
        let mut owned = self
            .store
            .collect(&mut |_, record| record.identity.user_id == user_id && record.is_active(now));
        owned.sort_by_key(|(_, record)| record.created_at);

        owned
            .into_iter()
            .map(|(token, record)| RefreshTokenSummary {
                id: record.id,
                token_preview: opaque::redact(&token),
                session_preview: opaque::redact(&record.session_id),
                created_at: record.created_at,
                last_used: record.last_used,
                expires_at: record.expires_at,
            })
            .collect()
    }

    /// 저장된 토큰 수 (만료 포함).
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// 저장된 토큰이 없는지 여부.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// 만료 토큰 정리.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let removed = self.store.retain(&mut |_, record| record.is_active(now));
        let tombstones = self.rotated.retain(&mut |_, expires_at| now < *expires_at);
        if removed > 0 || tombstones > 0 {
            tracing::debug!(
                removed = removed,
                rotated = tombstones,
                "Swept expired refresh tokens"
            );
        }
        removed
    }

    fn revoked(&self, token: &str, record: &RefreshTokenRecord, reason: RevocationReason) {
        counter!("auth_refresh_tokens_revoked_total", "reason" => reason.as_str()).increment(1);
        tracing::info!(
            user_id = %record.identity.user_id,
            username = %record.identity.username,
            reason = %reason,
            "Refresh token revoked"
        );
        self.events.record(&SecurityEvent::RefreshTokenRevoked {
            user_id: record.identity.user_id.clone(),
            token_preview: opaque::redact(token),
            reason,
        });
    }
}

impl std::fmt::Debug for RefreshTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenManager")
            .field("ttl", &self.ttl)
            .field("max_per_user", &self.max_per_user)
            .field("tokens", &self.store.len())
            .finish()
    }
}
