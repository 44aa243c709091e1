//! 인증 에러 타입.
//!
//! 내부 저장소 미스, 서명 실패, 만료 등은 모두 이 모듈의 종류 중 하나로
//! 변환된 뒤에만 호출자에게 전달됩니다.

use thiserror::Error;

use crate::roles::{Permission, Role};

/// 호출자에게 노출되는 인증/인가 에러.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// 요청 한도 초과 (재시도 가능)
    #[error("요청 한도를 초과했습니다. {retry_after}초 후 다시 시도하세요")]
    RateLimited {
        /// 재시도까지 대기 시간 (초)
        retry_after: u64,
    },

    /// 반복된 로그인 실패로 잠김
    #[error("로그인 시도가 너무 많습니다. {retry_after}초 후 다시 시도하세요")]
    AccountLocked {
        /// 잠금 해제까지 남은 시간 (초)
        retry_after: u64,
    },

    /// 사용자명 또는 비밀번호 불일치.
    ///
    /// 계정이 없는 경우와 비밀번호가 틀린 경우의 메시지가 동일합니다.
    #[error("사용자명 또는 비밀번호가 올바르지 않습니다")]
    InvalidCredentials,

    /// 잘못된 서명, 만료, 폐기/교체된 토큰, 비활성 세션
    #[error("유효하지 않거나 만료된 토큰입니다")]
    InvalidOrExpiredToken,

    /// 인증 주체 없음
    #[error("인증이 필요합니다")]
    AuthenticationRequired,

    /// 권한 부족
    #[error("권한이 부족합니다: {0} 필요")]
    InsufficientPermission(Permission),

    /// 역할 불일치
    #[error("역할이 부족합니다: {0} 필요")]
    InsufficientRole(Role),

    /// 토큰 서명 등 내부 처리 실패
    #[error("내부 인증 처리 오류")]
    Internal(String),
}

/// 인증 작업을 위한 Result 타입.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// 안정적인 에러 코드.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::RateLimited { .. } => "RATE_LIMITED",
            AuthError::AccountLocked { .. } => "ACCOUNT_LOCKED",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::InvalidOrExpiredToken => "INVALID_OR_EXPIRED_TOKEN",
            AuthError::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            AuthError::InsufficientPermission(_) => "INSUFFICIENT_PERMISSION",
            AuthError::InsufficientRole(_) => "INSUFFICIENT_ROLE",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP 상태 코드 힌트.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::RateLimited { .. } | AuthError::AccountLocked { .. } => 429,
            AuthError::InvalidCredentials
            | AuthError::InvalidOrExpiredToken
            | AuthError::AuthenticationRequired => 401,
            AuthError::InsufficientPermission(_) | AuthError::InsufficientRole(_) => 403,
            AuthError::Internal(_) => 500,
        }
    }

    /// 재시도까지 대기 시간 (초).
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AuthError::RateLimited { retry_after } | AuthError::AccountLocked { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    /// 같은 입력으로 나중에 재시도할 수 있는지 여부.
    pub fn is_retryable(&self) -> bool {
        self.retry_after().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_status() {
        let limited = AuthError::RateLimited { retry_after: 12 };
        assert_eq!(limited.code(), "RATE_LIMITED");
        assert_eq!(limited.status_code(), 429);
        assert_eq!(limited.retry_after(), Some(12));
        assert!(limited.is_retryable());

        let locked = AuthError::AccountLocked { retry_after: 900 };
        assert_eq!(locked.code(), "ACCOUNT_LOCKED");
        assert!(locked.is_retryable());

        assert_eq!(AuthError::InvalidCredentials.status_code(), 401);
        assert!(!AuthError::InvalidCredentials.is_retryable());
        assert_eq!(
            AuthError::InsufficientPermission(Permission::Delete).status_code(),
            403
        );
        assert_eq!(AuthError::InsufficientRole(Role::Admin).code(), "INSUFFICIENT_ROLE");
        assert_eq!(AuthError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_internal_detail_not_in_message() {
        let err = AuthError::Internal("signing key rejected".to_string());
        assert!(!err.to_string().contains("signing key"));
    }

    #[test]
    fn test_permission_message() {
        let err = AuthError::InsufficientPermission(Permission::Write);
        assert_eq!(err.to_string(), "권한이 부족합니다: write 필요");
    }
}
