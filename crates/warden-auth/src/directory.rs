//! 사용자 디렉터리와 자격 증명 검증기 인터페이스.
//!
//! 사용자 레코드의 영속화와 비밀번호 해시 알고리즘은 인증 코어 밖의 관심사입니다.
//! 코어는 두 트레잇을 통해서만 접근합니다.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use secrecy::SecretString;

use crate::gate::Identity;
use crate::roles::{Permission, Role};

/// 디렉터리에 저장된 사용자.
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// 사용자 ID
    pub id: String,
    /// 사용자 이름
    pub username: String,
    /// 역할
    pub role: Role,
    /// 권한 집합
    pub permissions: BTreeSet<Permission>,
    /// 저장된 비밀번호 해시 (PHC 형식 등, 검증기가 해석)
    pub secret_hash: SecretString,
    /// 마지막 로그인 시각
    pub last_login: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// 역할 기본 권한으로 생성.
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        role: Role,
        secret_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            role,
            permissions: role.default_permissions(),
            secret_hash: SecretString::from(secret_hash.into()),
            last_login: None,
        }
    }

    /// 권한 집합 지정.
    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions = permissions.into_iter().collect();
        self
    }

    /// 세션/토큰에 복사할 신원.
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.id.clone(),
            username: self.username.clone(),
            role: self.role,
            permissions: self.permissions.clone(),
        }
    }
}

/// 외부 사용자 저장소.
pub trait UserDirectory: Send + Sync {
    /// 사용자명으로 조회.
    fn find_by_username(&self, username: &str) -> Option<UserRecord>;

    /// 마지막 로그인 시각 기록.
    fn record_last_login(&self, user_id: &str, at: DateTime<Utc>);
}

/// 공유 디렉터리 핸들.
pub type SharedUserDirectory = Arc<dyn UserDirectory>;

/// 외부 비밀번호 검증기.
///
/// 해시 알고리즘 선택과 실행은 구현체가 담당합니다.
pub trait CredentialVerifier: Send + Sync {
    /// 입력한 비밀번호가 저장된 해시와 일치하는지 확인.
    fn verify(&self, username: &str, supplied: &str, stored_hash: &str) -> bool;
}

/// 공유 검증기 핸들.
pub type SharedCredentialVerifier = Arc<dyn CredentialVerifier>;

/// 인메모리 사용자 디렉터리.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<String, UserRecord>,
}

impl InMemoryUserDirectory {
    /// 빈 디렉터리 생성.
    pub fn new() -> Self {
        Self::default()
    }

    /// 공유 핸들로 생성.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// 사용자 추가 (같은 사용자명은 덮어씀).
    pub fn insert(&self, user: UserRecord) -> Option<UserRecord> {
        self.users.insert(user.username.clone(), user)
    }

    /// 사용자 삭제.
    pub fn remove(&self, username: &str) -> Option<UserRecord> {
        self.users.remove(username).map(|(_, user)| user)
    }

    /// 사용자 ID로 조회.
    pub fn find_by_id(&self, user_id: &str) -> Option<UserRecord> {
        self.users
            .iter()
            .find(|entry| entry.value().id == user_id)
            .map(|entry| entry.value().clone())
    }

    /// 등록된 사용자 수.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// 비어 있는지 여부.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find_by_username(&self, username: &str) -> Option<UserRecord> {
        self.users.get(username).map(|entry| entry.value().clone())
    }

    fn record_last_login(&self, user_id: &str, at: DateTime<Utc>) {
        if let Some(mut entry) = self
            .users
            .iter_mut()
            .find(|entry| entry.value().id == user_id)
        {
            entry.value_mut().last_login = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_find() {
        let directory = InMemoryUserDirectory::new();
        directory.insert(UserRecord::new("u1", "alice", Role::Admin, "$argon2id$hash"));

        let user = directory.find_by_username("alice").unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.permissions.len(), 4);
        assert!(directory.find_by_username("mallory").is_none());
        assert_eq!(directory.find_by_id("u1").unwrap().username, "alice");
    }

    #[test]
    fn test_record_last_login() {
        let directory = InMemoryUserDirectory::new();
        directory.insert(UserRecord::new("u1", "alice", Role::User, "h"));

        let at = Utc::now();
        directory.record_last_login("u1", at);
        directory.record_last_login("unknown", at);
        assert_eq!(directory.find_by_username("alice").unwrap().last_login, Some(at));
    }

    #[test]
    fn test_identity_snapshot() {
        let user = UserRecord::new("u1", "alice", Role::Monitor, "h")
            .with_permissions([Permission::Read, Permission::Write]);
        let identity = user.identity();
        assert_eq!(identity.role, Role::Monitor);
        assert!(identity.permissions.contains(&Permission::Write));
    }

    #[test]
    fn test_secret_hash_not_in_debug_output() {
        let user = UserRecord::new("u1", "alice", Role::User, "super-secret-hash");
        assert!(!format!("{:?}", user).contains("super-secret-hash"));
    }
}
