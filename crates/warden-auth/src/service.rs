//! 인증 서비스.
//!
//! 구성 요소를 묶어 호출 계층(HTTP 라우팅 등)에 노출되는 흐름을 제공합니다.
//!
//! # 로그인
//!
//! 1. 요청 한도(`auth`) 확인
//! 2. 로그인 잠금 확인 (잠겨 있으면 자격 증명 검증을 건너뜀)
//! 3. 사용자 디렉터리 조회 + 자격 증명 검증
//! 4. 세션 생성 → Refresh Token 발급 → 두 토큰 서명
//!
//! # 요청 인증
//!
//! Access Token 서명만으로는 충분하지 않습니다. 토큰의 `sessionId`를 세션
//! 관리자로 다시 확인하므로 로그아웃/폐기된 세션의 토큰은 즉시 거부됩니다.

use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::{auth_span, AuthConfig, CoreError, CoreResult, PasswordPolicy, SharedClock, SystemClock};

use crate::directory::{SharedCredentialVerifier, SharedUserDirectory};
use crate::error::{AuthError, AuthResult};
use crate::events::{RevocationReason, SecurityEvent, SharedEventSink, TracingEventSink};
use crate::gate::{Principal, Requirement};
use crate::jwt::{TokenError, TokenIssuer};
use crate::login_guard::{LoginAttemptGuard, LoginAttemptRecord};
use crate::password::{validate_password, Argon2Verifier, PasswordValidation};
use crate::rate_limit::{RateLimitCategory, RateLimitWindow, RateLimiter};
use crate::refresh::{RefreshTokenManager, RefreshTokenRecord, RefreshTokenSummary};
use crate::session::{ClientInfo, Session, SessionManager};
use crate::store::SharedStore;
use crate::sweeper::Sweeper;

/// IP를 알 수 없는 요청의 요청 한도 키.
const UNKNOWN_CLIENT: &str = "unknown";

/// Access Token + Refresh Token 페어.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Access Token
    pub access_token: String,
    /// 서명된 Refresh 봉투
    pub refresh_token: String,
    /// Access Token 만료까지 남은 시간 (초)
    pub expires_in: i64,
    /// Refresh Token 만료까지 남은 시간 (초)
    pub refresh_expires_in: i64,
    /// 토큰 타입 (항상 "Bearer")
    pub token_type: String,
}

/// 인증 서비스.
#[derive(Clone)]
pub struct AuthService {
    rate_limiter: RateLimiter,
    login_guard: LoginAttemptGuard,
    sessions: SessionManager,
    refresh_tokens: RefreshTokenManager,
    issuer: TokenIssuer,
    directory: SharedUserDirectory,
    verifier: SharedCredentialVerifier,
    events: SharedEventSink,
    clock: SharedClock,
    config: Arc<AuthConfig>,
}

impl AuthService {
    /// 빌더 생성.
    pub fn builder(config: AuthConfig) -> AuthServiceBuilder {
        AuthServiceBuilder::new(config)
    }

    /// 로그인.
    ///
    /// 계정이 없는 경우와 비밀번호가 틀린 경우 모두 [`AuthError::InvalidCredentials`]를
    /// 반환하며 둘 다 실패 횟수에 포함됩니다.
    pub fn login(&self, identifier: &str, secret: &str, client: ClientInfo) -> AuthResult<TokenPair> {
        let _span = auth_span!("login", identifier).entered();

        let rate_key = client.ip.as_deref().unwrap_or(identifier);
        self.rate_limiter
            .check(rate_key, RateLimitCategory::Auth)
            .into_result()?;

        let status = self.login_guard.check(identifier);
        if let Some(retry_after) = status.retry_after.filter(|_| !status.allowed) {
            tracing::warn!(identifier = %identifier, retry_after = retry_after, "Login attempt while locked");
            self.events.record(&SecurityEvent::LockedAttempt {
                identifier: identifier.to_string(),
                retry_after,
            });
            return Err(AuthError::AccountLocked { retry_after });
        }

        let user = self.directory.find_by_username(identifier).filter(|user| {
            self.verifier
                .verify(identifier, secret, user.secret_hash.expose_secret())
        });

        let Some(user) = user else {
            let attempts = self
                .login_guard
                .record(identifier, false)
                .map_or(0, |record| record.count);
            self.events.record(&SecurityEvent::LoginFailed {
                identifier: identifier.to_string(),
                ip: client.ip.clone(),
                attempts,
            });
            return Err(AuthError::InvalidCredentials);
        };

        self.login_guard.record(identifier, true);

        let identity = user.identity();
        let session = self.sessions.create(&identity, client.clone());
        let (token, record) = self.refresh_tokens.mint(&identity, &session.id);
        let pair = self.issue_pair(&session, &token, &record)?;

        self.directory.record_last_login(&user.id, self.clock.now());
        self.events.record(&SecurityEvent::LoginSucceeded {
            user_id: user.id.clone(),
            username: user.username.clone(),
            session_id: crate::opaque::redact(&session.id),
            ip: client.ip,
        });
        tracing::info!(user_id = %user.id, role = %user.role, "Login succeeded");

        Ok(pair)
    }

    /// Refresh 봉투로 새 토큰 페어 발급.
    ///
    /// 항상 새 세션과 새 Refresh Token을 만듭니다. 로테이션이 켜져 있으면
    /// 제출된 토큰은 원자적으로 소비되어 다시 사용할 수 없습니다.
    pub fn refresh(&self, refresh_token: &str, client: ClientInfo) -> AuthResult<TokenPair> {
        let rate_key = client.ip.as_deref().unwrap_or(UNKNOWN_CLIENT);
        self.rate_limiter
            .check(rate_key, RateLimitCategory::Refresh)
            .into_result()?;

        let claims = self.issuer.verify_refresh(refresh_token).map_err(|e| {
            tracing::debug!(error = %e, "Refresh envelope rejected");
            AuthError::InvalidOrExpiredToken
        })?;

        let record = if self.config.tokens.rotate_refresh_tokens {
            self.refresh_tokens.consume(&claims.token, &claims.user_id)
        } else {
            self.refresh_tokens.validate(&claims.token)
        };

        let Some(record) = record else {
            if self.refresh_tokens.was_rotated(&claims.token) {
                tracing::warn!(user_id = %claims.user_id, "Rotated refresh token presented again");
                self.events.record(&SecurityEvent::RefreshTokenReuse {
                    user_id: claims.user_id,
                });
            } else {
                tracing::debug!(user_id = %claims.user_id, "Refresh token not found (revoked or expired)");
            }
            return Err(AuthError::InvalidOrExpiredToken);
        };

        if record.identity.user_id != claims.user_id {
            tracing::warn!(user_id = %claims.user_id, "Refresh envelope does not match stored token owner");
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let _span = auth_span!("refresh", record.identity.username).entered();
        let session = self.sessions.create(&record.identity, client);
        let (token, new_record) = self.refresh_tokens.mint(&record.identity, &session.id);
        let pair = self.issue_pair(&session, &token, &new_record)?;

        tracing::info!(user_id = %record.identity.user_id, "Token refreshed");
        Ok(pair)
    }

    /// 요청마다 Access Token 인증.
    ///
    /// 서명/만료 검증 후 세션이 아직 활성인지 확인하고 클라이언트 정보를 갱신합니다.
    pub fn authenticate(&self, access_token: &str, client: ClientInfo) -> AuthResult<Principal> {
        let rate_key = client.ip.as_deref().unwrap_or(UNKNOWN_CLIENT);
        self.rate_limiter
            .check(rate_key, RateLimitCategory::General)
            .into_result()?;

        let claims = self.issuer.verify_access(access_token).map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            AuthError::InvalidOrExpiredToken
        })?;

        let session = self
            .sessions
            .validate_with_client(&claims.session_id, &client)
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        if session.identity.user_id != claims.user_id {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        Ok(session.principal())
    }

    /// 로그아웃.
    ///
    /// 세션을 폐기하고 세션 사용자의 모든 Refresh Token을 폐기합니다.
    /// 폐기된 Refresh Token 수를 반환합니다. 이미 없는 세션이면 0입니다.
    pub fn logout(&self, session_id: &str) -> usize {
        let Some(session) = self.sessions.revoke(session_id) else {
            tracing::debug!("Logout for unknown or expired session");
            return 0;
        };

        let user_id = &session.identity.user_id;
        let revoked = self
            .refresh_tokens
            .revoke_all_for_user_with_reason(user_id, RevocationReason::Logout);
        tracing::info!(user_id = %user_id, revoked = revoked, "User logged out");
        revoked
    }

    /// 사용자의 활성 Refresh Token 목록 (가려진 형태).
    pub fn list_refresh_tokens(&self, user_id: &str) -> Vec<RefreshTokenSummary> {
        self.refresh_tokens.list_active_for_user(user_id)
    }

    /// 사용자의 Refresh Token 하나를 식별자로 폐기.
    pub fn revoke_refresh_token(&self, user_id: &str, token_id: Uuid) -> bool {
        self.refresh_tokens.revoke_by_id(token_id, Some(user_id))
    }

    /// 권한/역할 판정. 거부 시 보안 이벤트를 기록합니다.
    pub fn authorize(&self, principal: Option<&Principal>, requirement: Requirement) -> AuthResult<()> {
        let result = requirement.check(principal);
        if let (Err(AuthError::InsufficientPermission(_) | AuthError::InsufficientRole(_)), Some(principal)) =
            (&result, principal)
        {
            self.events.record(&SecurityEvent::PermissionDenied {
                username: principal.username().to_string(),
                requirement: requirement.to_string(),
            });
        }
        result
    }

    /// 설정된 정책으로 비밀번호 검증.
    pub fn validate_password(&self, password: &str) -> PasswordValidation {
        validate_password(&self.config.password, password)
    }

    /// 비밀번호 정책.
    pub fn password_policy(&self) -> &PasswordPolicy {
        &self.config.password
    }

    /// 정리 작업 생성.
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            self.sessions.clone(),
            self.rate_limiter.clone(),
            self.login_guard.clone(),
            self.refresh_tokens.clone(),
            self.config.sweep.clone(),
        )
    }

    /// 요청 한도 관리자.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// 로그인 시도 관리자.
    pub fn login_guard(&self) -> &LoginAttemptGuard {
        &self.login_guard
    }

    /// 세션 관리자.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Refresh Token 관리자.
    pub fn refresh_tokens(&self) -> &RefreshTokenManager {
        &self.refresh_tokens
    }

    /// 토큰 발급기.
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// 설정.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn issue_pair(
        &self,
        session: &Session,
        token: &str,
        record: &RefreshTokenRecord,
    ) -> AuthResult<TokenPair> {
        let (access_token, claims) = self.issuer.issue_access_token(session).map_err(internal)?;
        let refresh_token = self
            .issuer
            .issue_refresh_token(token, record)
            .map_err(internal)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: claims.exp - claims.iat,
            refresh_expires_in: (record.expires_at - record.created_at).num_seconds(),
            token_type: "Bearer".to_string(),
        })
    }
}

fn internal(error: TokenError) -> AuthError {
    tracing::error!(error = %error, "Token signing failed");
    AuthError::Internal(error.to_string())
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("rate_limiter", &self.rate_limiter)
            .field("login_guard", &self.login_guard)
            .field("sessions", &self.sessions)
            .field("refresh_tokens", &self.refresh_tokens)
            .finish_non_exhaustive()
    }
}

/// [`AuthService`] 빌더.
///
/// 저장소, 시계, 이벤트 싱크를 지정하지 않으면 인메모리 저장소,
/// 시스템 시계, tracing 싱크를 사용합니다.
pub struct AuthServiceBuilder {
    config: AuthConfig,
    clock: Option<SharedClock>,
    events: Option<SharedEventSink>,
    directory: Option<SharedUserDirectory>,
    verifier: Option<SharedCredentialVerifier>,
    session_store: Option<SharedStore<Session>>,
    refresh_store: Option<SharedStore<RefreshTokenRecord>>,
    attempt_store: Option<SharedStore<LoginAttemptRecord>>,
    rate_limit_store: Option<SharedStore<RateLimitWindow>>,
}

impl AuthServiceBuilder {
    /// 설정으로 빌더 생성.
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            clock: None,
            events: None,
            directory: None,
            verifier: None,
            session_store: None,
            refresh_store: None,
            attempt_store: None,
            rate_limit_store: None,
        }
    }

    /// 시계 지정.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 보안 이벤트 싱크 지정.
    pub fn events(mut self, events: SharedEventSink) -> Self {
        self.events = Some(events);
        self
    }

    /// 사용자 디렉터리 지정 (필수).
    pub fn directory(mut self, directory: SharedUserDirectory) -> Self {
        self.directory = Some(directory);
        self
    }

    /// 자격 증명 검증기 지정 (기본: Argon2).
    pub fn verifier(mut self, verifier: SharedCredentialVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// 세션 저장소 지정.
    pub fn session_store(mut self, store: SharedStore<Session>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Refresh Token 저장소 지정.
    pub fn refresh_token_store(mut self, store: SharedStore<RefreshTokenRecord>) -> Self {
        self.refresh_store = Some(store);
        self
    }

    /// 로그인 시도 저장소 지정.
    pub fn login_attempt_store(mut self, store: SharedStore<LoginAttemptRecord>) -> Self {
        self.attempt_store = Some(store);
        self
    }

    /// 요청 한도 저장소 지정.
    pub fn rate_limit_store(mut self, store: SharedStore<RateLimitWindow>) -> Self {
        self.rate_limit_store = Some(store);
        self
    }

    /// 설정을 검증하고 서비스를 생성합니다.
    pub fn build(self) -> CoreResult<AuthService> {
        self.config.validate()?;

        let directory = self
            .directory
            .ok_or_else(|| CoreError::config("a user directory is required"))?;
        let verifier = self.verifier.unwrap_or_else(Argon2Verifier::shared);
        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let events = self.events.unwrap_or_else(TracingEventSink::shared);
        let config = self.config;

        let mut rate_limiter =
            RateLimiter::new(config.rate_limit.clone(), clock.clone()).with_events(events.clone());
        if let Some(store) = self.rate_limit_store {
            rate_limiter = rate_limiter.with_store(store);
        }

        let mut login_guard =
            LoginAttemptGuard::new(config.lockout.clone(), clock.clone()).with_events(events.clone());
        if let Some(store) = self.attempt_store {
            login_guard = login_guard.with_store(store);
        }

        let mut sessions =
            SessionManager::new(config.tokens.session_ttl(), clock.clone()).with_events(events.clone());
        if let Some(store) = self.session_store {
            sessions = sessions.with_store(store);
        }

        let mut refresh_tokens = RefreshTokenManager::new(
            config.tokens.refresh_token_ttl(),
            config.tokens.max_refresh_tokens_per_user,
            clock.clone(),
        )
        .with_events(events.clone());
        if let Some(store) = self.refresh_store {
            refresh_tokens = refresh_tokens.with_store(store);
        }

        let issuer = TokenIssuer::from_config(&config.tokens, clock.clone());

        tracing::info!(
            access_ttl_secs = config.tokens.access_token_ttl_secs,
            refresh_ttl_secs = config.tokens.refresh_token_ttl_secs,
            session_ttl_secs = config.tokens.session_ttl_secs,
            rotation = config.tokens.rotate_refresh_tokens,
            "Auth service initialized"
        );

        Ok(AuthService {
            rate_limiter,
            login_guard,
            sessions,
            refresh_tokens,
            issuer,
            directory,
            verifier,
            events,
            clock,
            config: Arc::new(config),
        })
    }
}
