//! JWT 토큰 처리.
//!
//! Access Token과 Refresh 봉투를 서로 다른 비밀 키로 서명합니다. 한쪽 키가
//! 유출되어도 다른 종류의 토큰은 위조할 수 없습니다.
//!
//! 만료 판단은 jsonwebtoken의 시스템 시각 대신 주입된 [`Clock`]으로 합니다.
//!
//! [`Clock`]: warden_core::Clock

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use warden_core::{SharedClock, TokenConfig};

use crate::refresh::RefreshTokenRecord;
use crate::roles::{Permission, Role};
use crate::session::Session;

/// Refresh 봉투의 `type` 값.
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

/// JWT Access Token 페이로드.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    /// 사용자 ID
    pub user_id: String,
    /// 사용자 이름
    pub username: String,
    /// 사용자 역할
    pub role: Role,
    /// 권한 집합
    pub permissions: BTreeSet<Permission>,
    /// 세션 ID (검증 시 세션 관리자에서 다시 확인)
    pub session_id: String,
    /// Issued At (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// JWT ID
    pub jti: String,
}

/// Refresh 봉투 페이로드.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshClaims {
    /// 불투명 Refresh Token
    pub token: String,
    /// 사용자 ID
    pub user_id: String,
    /// 토큰 종류 (항상 "refresh")
    #[serde(rename = "type")]
    pub token_type: String,
    /// Issued At
    pub iat: i64,
    /// Expiration
    pub exp: i64,
}

/// 만료 시각을 가진 클레임.
pub trait TokenClaims: DeserializeOwned {
    /// 만료 시각 (Unix timestamp).
    fn expires_at(&self) -> i64;
}

impl TokenClaims for AccessClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl TokenClaims for RefreshClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// JWT 처리 에러.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("토큰 서명이 유효하지 않습니다")]
    InvalidSignature,
    #[error("토큰이 만료되었습니다")]
    Expired,
    #[error("토큰 인코딩 실패: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}

/// 서명된 토큰을 검증하고 클레임을 반환합니다.
///
/// 형식 오류, 잘못된 서명은 모두 [`TokenError::InvalidSignature`]입니다.
/// `now >= exp`이면 [`TokenError::Expired`]입니다.
pub fn verify<T: TokenClaims>(
    token: &str,
    key: &DecodingKey,
    now: DateTime<Utc>,
) -> Result<T, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;

    let data = decode::<T>(token, key, &validation).map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::InvalidSignature,
    })?;

    if now.timestamp() >= data.claims.expires_at() {
        return Err(TokenError::Expired);
    }
    Ok(data.claims)
}

/// 토큰 발급/검증기.
#[derive(Clone)]
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: chrono::Duration,
    clock: SharedClock,
}

impl TokenIssuer {
    /// 두 비밀 키로 생성.
    pub fn new(
        access_secret: &SecretString,
        refresh_secret: &SecretString,
        access_ttl: chrono::Duration,
        clock: SharedClock,
    ) -> Self {
        let access = access_secret.expose_secret().as_bytes();
        let refresh = refresh_secret.expose_secret().as_bytes();
        Self {
            access_encoding: EncodingKey::from_secret(access),
            access_decoding: DecodingKey::from_secret(access),
            refresh_encoding: EncodingKey::from_secret(refresh),
            refresh_decoding: DecodingKey::from_secret(refresh),
            access_ttl,
            clock,
        }
    }

    /// 토큰 설정에서 생성.
    pub fn from_config(config: &TokenConfig, clock: SharedClock) -> Self {
        Self::new(
            &config.access_token_secret,
            &config.refresh_token_secret,
            config.access_token_ttl(),
            clock,
        )
    }

    /// Access Token TTL.
    pub fn access_ttl(&self) -> chrono::Duration {
        self.access_ttl
    }

    /// 세션에 대한 Access Token 발급 (secret A).
    pub fn issue_access_token(&self, session: &Session) -> Result<(String, AccessClaims), TokenError> {
        let now = self.clock.now();
        let claims = AccessClaims {
            user_id: session.identity.user_id.clone(),
            username: session.identity.username.clone(),
            role: session.identity.role,
            permissions: session.identity.permissions.clone(),
            session_id: session.id.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)?;
        Ok((token, claims))
    }

    /// 불투명 Refresh Token을 봉투로 감싸 서명 (secret B).
    ///
    /// 봉투 만료 시각은 저장된 레코드의 만료 시각과 같습니다.
    pub fn issue_refresh_token(
        &self,
        token: &str,
        record: &RefreshTokenRecord,
    ) -> Result<String, TokenError> {
        let claims = RefreshClaims {
            token: token.to_string(),
            user_id: record.identity.user_id.clone(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            iat: record.created_at.timestamp(),
            exp: record.expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding).map_err(TokenError::from)
    }

    /// Access Token 서명/만료 검증.
    ///
    /// 세션 활성 여부는 확인하지 않습니다. 호출자가 세션 관리자로 다시 확인해야 합니다.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        verify(token, &self.access_decoding, self.clock.now())
    }

    /// Refresh 봉투 서명/만료 검증.
    ///
    /// 불투명 토큰이 저장소에 남아 있는지는 확인하지 않습니다.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = verify(token, &self.refresh_decoding, self.clock.now())?;
        if claims.token_type != REFRESH_TOKEN_TYPE {
            return Err(TokenError::InvalidSignature);
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use chrono::Duration;
    use warden_core::ManualClock;

    use crate::gate::Identity;
    use crate::refresh::RefreshTokenManager;
    use crate::session::{ClientInfo, SessionManager};

    const ACCESS_SECRET: &str = "access-secret-key-for-jwt-testing-minimum-32-chars";
    const REFRESH_SECRET: &str = "refresh-secret-key-for-jwt-testing-minimum-32-chars";

    struct Fixture {
        clock: Arc<ManualClock>,
        issuer: TokenIssuer,
        session: Session,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let issuer = TokenIssuer::new(
            &SecretString::from(ACCESS_SECRET),
            &SecretString::from(REFRESH_SECRET),
            Duration::hours(24),
            clock.clone(),
        );
        let sessions = SessionManager::new(Duration::minutes(30), clock.clone());
        let session = sessions.create(
            &Identity::new("user123", "testuser", Role::Monitor),
            ClientInfo::default(),
        );
        Fixture {
            clock,
            issuer,
            session,
        }
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let f = fixture();
        let (token, issued) = f.issuer.issue_access_token(&f.session).unwrap();
        assert!(!token.is_empty());

        let claims = f.issuer.verify_access(&token).unwrap();
        assert_eq!(claims, issued);
        assert_eq!(claims.user_id, "user123");
        assert_eq!(claims.session_id, f.session.id);
        assert_eq!(claims.role, Role::Monitor);
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[test]
    fn test_access_claims_wire_format() {
        let f = fixture();
        let (_, claims) = f.issuer.issue_access_token(&f.session).unwrap();
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["userId"], "user123");
        assert_eq!(json["role"], "monitor");
        assert_eq!(json["permissions"], serde_json::json!(["read"]));
        assert!(json.get("sessionId").is_some());
    }

    #[test]
    fn test_access_token_expiry_uses_clock() {
        let f = fixture();
        let (token, _) = f.issuer.issue_access_token(&f.session).unwrap();

        f.clock.advance(Duration::hours(24) - Duration::seconds(1));
        assert!(f.issuer.verify_access(&token).is_ok());

        f.clock.advance(Duration::seconds(1));
        assert_matches!(f.issuer.verify_access(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_secrets_are_independent_trust_domains() {
        let f = fixture();
        let (access, _) = f.issuer.issue_access_token(&f.session).unwrap();
        assert_matches!(
            f.issuer.verify_refresh(&access),
            Err(TokenError::InvalidSignature)
        );

        let refresh = RefreshTokenManager::new(Duration::days(7), 5, f.clock.clone());
        let (opaque, record) = refresh.mint(&f.session.identity, &f.session.id);
        let envelope = f.issuer.issue_refresh_token(&opaque, &record).unwrap();
        assert_matches!(
            f.issuer.verify_access(&envelope),
            Err(TokenError::InvalidSignature)
        );

        let claims = f.issuer.verify_refresh(&envelope).unwrap();
        assert_eq!(claims.token, opaque);
        assert_eq!(claims.token_type, "refresh");
        assert_eq!(claims.exp, record.expires_at.timestamp());
    }

    #[test]
    fn test_wrong_secret_and_garbage() {
        let f = fixture();
        let (token, _) = f.issuer.issue_access_token(&f.session).unwrap();

        let other = TokenIssuer::new(
            &SecretString::from("wrong-secret-key-for-testing-minimum-32-chars"),
            &SecretString::from(REFRESH_SECRET),
            Duration::hours(24),
            f.clock.clone(),
        );
        assert_matches!(other.verify_access(&token), Err(TokenError::InvalidSignature));
        assert_matches!(
            f.issuer.verify_access("invalid.token.here"),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let f = fixture();
        let (token, _) = f.issuer.issue_access_token(&f.session).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let (forged, _) = f.issuer.issue_access_token(&Session {
            identity: Identity::new("user123", "testuser", Role::Admin),
            ..f.session.clone()
        })
        .unwrap();
        let forged_payload = forged.split('.').nth(1).unwrap().to_string();
        parts[1] = &forged_payload;

        assert_matches!(
            f.issuer.verify_access(&parts.join(".")),
            Err(TokenError::InvalidSignature)
        );
    }
}
