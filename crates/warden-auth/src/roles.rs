//! 역할 기반 접근 제어 (RBAC).
//!
//! 관리자 API의 역할 및 권한 정의.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// 사용자 역할.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 관리자 - 모든 권한 보유
    Admin,
    /// 모니터 - 대시보드 조회 전용
    Monitor,
    /// 일반 사용자 - 읽기 전용
    User,
}

impl Role {
    /// 역할 생성 시 부여되는 기본 권한 집합.
    ///
    /// 실제 판정은 세션에 기록된 권한 집합으로 합니다. 사용자 레코드에
    /// 권한이 명시되지 않았을 때만 이 값을 사용합니다.
    pub fn default_permissions(&self) -> BTreeSet<Permission> {
        match self {
            Role::Admin => Permission::ALL.into_iter().collect(),
            Role::Monitor | Role::User => BTreeSet::from([Permission::Read]),
        }
    }

    /// 문자열에서 역할 파싱.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "monitor" => Some(Role::Monitor),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    /// 직렬화 이름.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Monitor => "monitor",
            Role::User => "user",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 시스템 권한.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// 조회
    Read,
    /// 생성/수정
    Write,
    /// 삭제
    Delete,
    /// 사용자/시스템 관리
    Admin,
}

impl Permission {
    /// 전체 권한 목록.
    pub const ALL: [Permission; 4] = [
        Permission::Read,
        Permission::Write,
        Permission::Delete,
        Permission::Admin,
    ];

    /// 문자열에서 권한 파싱.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "read" => Some(Permission::Read),
            "write" => Some(Permission::Write),
            "delete" => Some(Permission::Delete),
            "admin" => Some(Permission::Admin),
            _ => None,
        }
    }

    /// 직렬화 이름.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Delete => "delete",
            Permission::Admin => "admin",
        }
    }

    /// 권한에 대한 설명 반환.
    pub fn description(&self) -> &'static str {
        match self {
            Permission::Read => "데이터 조회",
            Permission::Write => "데이터 생성/수정",
            Permission::Delete => "데이터 삭제",
            Permission::Admin => "사용자 및 시스템 관리",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
