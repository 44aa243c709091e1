//! # Warden Auth
//!
//! 관리자 API 호출자의 인증과 자격 증명 수명 주기를 관리합니다.
//!
//! ## 구성 요소
//!
//! - [`RateLimiter`]: 카테고리별 요청 한도 (첫 요청 기준 고정 윈도우)
//! - [`LoginAttemptGuard`]: 식별자별 실패 횟수 및 잠금
//! - [`SessionManager`]: 짧은 수명의 인증 세션
//! - [`RefreshTokenManager`]: 세션과 짝을 이루는 긴 수명 토큰 (사용 시 교체)
//! - [`TokenIssuer`]: Access Token / Refresh 봉투 서명 및 검증
//! - [`gate`]: 인증된 주체에 대한 권한/역할 판정
//!
//! [`AuthService`]가 위 구성 요소를 묶어 `login`, `refresh`, `authenticate`,
//! `logout` 흐름을 제공하고, [`Sweeper`]가 만료 레코드를 주기적으로 정리합니다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use warden_auth::{AuthService, ClientInfo, InMemoryUserDirectory, Argon2Verifier};
//!
//! let directory = InMemoryUserDirectory::shared();
//! let service = AuthService::builder(config)
//!     .directory(directory)
//!     .verifier(Argon2Verifier::shared())
//!     .build()?;
//!
//! let pair = service.login("alice", "Correct-Horse-9!", ClientInfo::from_ip("10.0.0.1"))?;
//! let principal = service.authenticate(&pair.access_token, ClientInfo::from_ip("10.0.0.1"))?;
//! ```

pub mod directory;
pub mod error;
pub mod events;
pub mod gate;
pub mod jwt;
pub mod login_guard;
pub mod opaque;
pub mod password;
pub mod rate_limit;
pub mod refresh;
pub mod roles;
pub mod service;
pub mod session;
pub mod store;
pub mod sweeper;

pub use directory::{
    CredentialVerifier, InMemoryUserDirectory, SharedCredentialVerifier, SharedUserDirectory,
    UserDirectory, UserRecord,
};
pub use error::{AuthError, AuthResult};
pub use events::{
    MemoryEventSink, RecordedEvent, RevocationReason, SecurityEvent, SecurityEventSink,
    SharedEventSink, Severity, TracingEventSink,
};
pub use gate::{require_admin, require_permission, require_role, Identity, Principal, Requirement};
pub use jwt::{AccessClaims, RefreshClaims, TokenError, TokenIssuer};
pub use login_guard::{LoginAttemptGuard, LoginAttemptRecord, LoginAttemptStatus};
pub use password::{hash_secret, validate_password, Argon2Verifier, PasswordError, PasswordValidation};
pub use rate_limit::{RateLimitCategory, RateLimitDecision, RateLimitWindow, RateLimiter};
pub use refresh::{RefreshTokenManager, RefreshTokenRecord, RefreshTokenSummary};
pub use roles::{Permission, Role};
pub use service::{AuthService, AuthServiceBuilder, TokenPair};
pub use session::{ClientInfo, Session, SessionManager};
pub use store::{MemoryStore, SharedStore, Store};
pub use sweeper::{SweepReport, Sweeper};
