//! 권한/역할 판정.
//!
//! 이미 인증된 주체에 대한 순수 판정 함수입니다. 주체가 없거나 요구 능력이
//! 없으면 항상 거부합니다.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};
use crate::roles::{Permission, Role};

/// 사용자 신원 (세션/토큰에 복사되는 스냅샷).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// 사용자 ID
    pub user_id: String,
    /// 사용자 이름
    pub username: String,
    /// 역할
    pub role: Role,
    /// 권한 집합
    pub permissions: BTreeSet<Permission>,
}

impl Identity {
    /// 역할 기본 권한으로 생성.
    pub fn new(user_id: impl Into<String>, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            role,
            permissions: role.default_permissions(),
        }
    }

    /// 권한 집합 지정.
    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.permissions = permissions.into_iter().collect();
        self
    }
}

/// 요청마다 인증이 끝난 주체.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// 신원
    #[serde(flatten)]
    pub identity: Identity,
    /// 현재 세션 ID
    pub session_id: String,
}

impl Principal {
    /// 사용자 ID.
    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    /// 사용자 이름.
    pub fn username(&self) -> &str {
        &self.identity.username
    }

    /// 역할.
    pub fn role(&self) -> Role {
        self.identity.role
    }

    /// 특정 권한 보유 여부.
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.identity.permissions.contains(&permission)
    }

    /// 역할 일치 여부 (상하 관계 없이 정확히 같은 역할).
    pub fn has_role(&self, role: Role) -> bool {
        self.identity.role == role
    }
}

/// 엔드포인트 접근 요건.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// 특정 권한 필요
    Permission(Permission),
    /// 특정 역할 필요
    Role(Role),
    /// 관리자 역할 필요
    Admin,
}

impl Requirement {
    /// 주체가 요건을 만족하는지 판정.
    pub fn check(&self, principal: Option<&Principal>) -> AuthResult<()> {
        match self {
            Requirement::Permission(permission) => require_permission(principal, *permission),
            Requirement::Role(role) => require_role(principal, *role),
            Requirement::Admin => require_admin(principal),
        }
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Requirement::Permission(p) => write!(f, "permission:{p}"),
            Requirement::Role(r) => write!(f, "role:{r}"),
            Requirement::Admin => write!(f, "admin"),
        }
    }
}

/// 권한 요구.
pub fn require_permission(principal: Option<&Principal>, permission: Permission) -> AuthResult<()> {
    let principal = principal.ok_or(AuthError::AuthenticationRequired)?;
    if principal.has_permission(permission) {
        return Ok(());
    }

    tracing::warn!(
        username = %principal.username(),
        permission = %permission,
        "Permission denied"
    );
    Err(AuthError::InsufficientPermission(permission))
}

/// 역할 요구.
pub fn require_role(principal: Option<&Principal>, role: Role) -> AuthResult<()> {
    let principal = principal.ok_or(AuthError::AuthenticationRequired)?;
    if principal.has_role(role) {
        return Ok(());
    }

    tracing::warn!(
        username = %principal.username(),
        role = %principal.role(),
        required = %role,
        "Role denied"
    );
    Err(AuthError::InsufficientRole(role))
}

/// 관리자 역할 요구.
pub fn require_admin(principal: Option<&Principal>) -> AuthResult<()> {
    require_role(principal, Role::Admin)
}
