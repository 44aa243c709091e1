//! 설정 관리.
//!
//! 인증 코어의 모든 정책 값(토큰 TTL, 로테이션, 잠금, 요청 한도, 정리 주기,
//! 비밀번호 정책)을 정의합니다. 파일 + 환경 변수(`WARDEN__*`) 또는
//! 평면 환경 변수(`JWT_SECRET` 등)에서 로드할 수 있습니다.

use std::path::Path;

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, CoreResult};

/// 서명 비밀 키의 최소 길이 (바이트).
pub const MIN_SECRET_LEN: usize = 32;

/// TTL, 잠금 시간, 윈도우, 정리 주기의 상한 (10년, 초).
pub const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// 초 단위 값을 `[0, MAX_DURATION_SECS]`로 제한한 기간.
fn bounded_seconds(secs: i64) -> Duration {
    Duration::seconds(secs.clamp(0, MAX_DURATION_SECS))
}

/// 인증 코어 전체 설정.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// 토큰/세션 설정
    #[serde(default)]
    pub tokens: TokenConfig,
    /// 로그인 잠금 설정
    #[serde(default)]
    pub lockout: LockoutConfig,
    /// 카테고리별 요청 한도
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// 백그라운드 정리 주기
    #[serde(default)]
    pub sweep: SweepConfig,
    /// 비밀번호 정책
    #[serde(default)]
    pub password: PasswordPolicy,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 토큰 및 세션 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Access Token 서명 키 (secret A)
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub access_token_secret: SecretString,
    /// Refresh 봉투 서명 키 (secret B, access 키와 독립)
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub refresh_token_secret: SecretString,
    /// Access Token 유효 기간 (초)
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_secs: i64,
    /// Refresh Token 유효 기간 (초)
    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_ttl_secs: i64,
    /// 세션 유효 기간 (초)
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: i64,
    /// 사용 시마다 Refresh Token 교체 여부
    #[serde(default = "default_true")]
    pub rotate_refresh_tokens: bool,
    /// 사용자당 최대 활성 Refresh Token 수
    #[serde(default = "default_max_refresh_tokens")]
    pub max_refresh_tokens_per_user: usize,
}

fn default_access_token_ttl() -> i64 {
    24 * 60 * 60
}
fn default_refresh_token_ttl() -> i64 {
    7 * 24 * 60 * 60
}
fn default_session_ttl() -> i64 {
    30 * 60
}
fn default_true() -> bool {
    true
}
fn default_max_refresh_tokens() -> usize {
    5
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_secret: SecretString::default(),
            refresh_token_secret: SecretString::default(),
            access_token_ttl_secs: default_access_token_ttl(),
            refresh_token_ttl_secs: default_refresh_token_ttl(),
            session_ttl_secs: default_session_ttl(),
            rotate_refresh_tokens: true,
            max_refresh_tokens_per_user: default_max_refresh_tokens(),
        }
    }
}

impl TokenConfig {
    /// Access Token TTL.
    pub fn access_token_ttl(&self) -> Duration {
        bounded_seconds(self.access_token_ttl_secs)
    }

    /// Refresh Token TTL.
    pub fn refresh_token_ttl(&self) -> Duration {
        bounded_seconds(self.refresh_token_ttl_secs)
    }

    /// 세션 TTL.
    pub fn session_ttl(&self) -> Duration {
        bounded_seconds(self.session_ttl_secs)
    }
}

/// 로그인 잠금 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LockoutConfig {
    /// 잠금 전 허용되는 연속 실패 횟수
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: u32,
    /// 잠금 유지 시간 (초), 실패할 때마다 다시 연장됨
    #[serde(default = "default_lockout_duration")]
    pub lockout_duration_secs: i64,
}

fn default_max_login_attempts() -> u32 {
    5
}
fn default_lockout_duration() -> i64 {
    15 * 60
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_login_attempts: default_max_login_attempts(),
            lockout_duration_secs: default_lockout_duration(),
        }
    }
}

impl LockoutConfig {
    /// 잠금 유지 시간.
    pub fn lockout_duration(&self) -> Duration {
        bounded_seconds(self.lockout_duration_secs)
    }
}

/// 윈도우 한도 (`windowMs`, `maxRequests`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct WindowLimit {
    /// 윈도우 길이 (밀리초)
    pub window_ms: i64,
    /// 윈도우당 최대 요청 수
    pub max_requests: usize,
}

impl WindowLimit {
    /// 새 한도 생성.
    pub const fn new(window_ms: i64, max_requests: usize) -> Self {
        Self {
            window_ms,
            max_requests,
        }
    }

    /// 윈도우 길이.
    pub fn window(&self) -> Duration {
        Duration::milliseconds(self.window_ms.clamp(0, MAX_DURATION_SECS * 1000))
    }
}

/// 카테고리별 요청 한도 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// 일반 API 요청 (15분 100회)
    #[serde(default = "default_general_limit")]
    pub general: WindowLimit,
    /// 로그인 요청 (5분 10회)
    #[serde(default = "default_auth_limit")]
    pub auth: WindowLimit,
    /// 토큰 갱신 요청 (1분 5회)
    #[serde(default = "default_refresh_limit")]
    pub refresh: WindowLimit,
}

fn default_general_limit() -> WindowLimit {
    WindowLimit::new(15 * 60 * 1000, 100)
}
fn default_auth_limit() -> WindowLimit {
    WindowLimit::new(5 * 60 * 1000, 10)
}
fn default_refresh_limit() -> WindowLimit {
    WindowLimit::new(60 * 1000, 5)
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            general: default_general_limit(),
            auth: default_auth_limit(),
            refresh: default_refresh_limit(),
        }
    }
}

/// 백그라운드 정리 주기 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SweepConfig {
    /// 만료 세션 정리 주기 (초)
    #[serde(default = "default_session_sweep")]
    pub session_interval_secs: u64,
    /// 요청 한도 윈도우 정리 주기 (초)
    #[serde(default = "default_rate_limit_sweep")]
    pub rate_limit_interval_secs: u64,
    /// 로그인 시도 기록 정리 주기 (초)
    #[serde(default = "default_login_attempt_sweep")]
    pub login_attempt_interval_secs: u64,
    /// 만료 Refresh Token 정리 주기 (초)
    #[serde(default = "default_refresh_token_sweep")]
    pub refresh_token_interval_secs: u64,
}

fn default_session_sweep() -> u64 {
    60
}
fn default_rate_limit_sweep() -> u64 {
    60
}
fn default_login_attempt_sweep() -> u64 {
    5 * 60
}
fn default_refresh_token_sweep() -> u64 {
    10 * 60
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            session_interval_secs: default_session_sweep(),
            rate_limit_interval_secs: default_rate_limit_sweep(),
            login_attempt_interval_secs: default_login_attempt_sweep(),
            refresh_token_interval_secs: default_refresh_token_sweep(),
        }
    }
}

impl SweepConfig {
    /// 세션 정리 주기.
    pub fn session_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session_interval_secs.min(MAX_DURATION_SECS as u64))
    }

    /// 요청 한도 윈도우 정리 주기.
    pub fn rate_limit_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.rate_limit_interval_secs.min(MAX_DURATION_SECS as u64))
    }

    /// 로그인 시도 기록 정리 주기.
    pub fn login_attempt_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.login_attempt_interval_secs.min(MAX_DURATION_SECS as u64))
    }

    /// Refresh Token 정리 주기.
    pub fn refresh_token_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_token_interval_secs.min(MAX_DURATION_SECS as u64))
    }
}

/// 비밀번호 정책.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PasswordPolicy {
    /// 최소 길이
    #[serde(default = "default_password_min_length")]
    pub min_length: usize,
    /// 대문자 필수
    #[serde(default = "default_true")]
    pub require_uppercase: bool,
    /// 소문자 필수
    #[serde(default = "default_true")]
    pub require_lowercase: bool,
    /// 숫자 필수
    #[serde(default = "default_true")]
    pub require_numbers: bool,
    /// 특수문자 필수
    #[serde(default = "default_true")]
    pub require_special_chars: bool,
}

fn default_password_min_length() -> usize {
    12
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: default_password_min_length(),
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
            require_special_chars: true,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

impl AuthConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 환경 변수는 `WARDEN__TOKENS__ACCESS_TOKEN_SECRET` 형식으로 파일 값을 덮어씁니다.
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("WARDEN")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AuthConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 평면 환경 변수에서 설정을 로드합니다.
    ///
    /// `.env` 파일이 있으면 먼저 읽습니다. `JWT_SECRET`과
    /// `REFRESH_TOKEN_SECRET`은 필수입니다.
    pub fn from_env() -> CoreResult<Self> {
        dotenvy::dotenv().ok();

        let access_token_secret = std::env::var("JWT_SECRET")
            .map_err(|_| CoreError::config("JWT_SECRET 환경변수가 설정되지 않았습니다"))?;
        let refresh_token_secret = std::env::var("REFRESH_TOKEN_SECRET").map_err(|_| {
            CoreError::config("REFRESH_TOKEN_SECRET 환경변수가 설정되지 않았습니다")
        })?;

        let defaults = RateLimitConfig::default();
        let config = Self {
            tokens: TokenConfig {
                access_token_secret: SecretString::from(access_token_secret),
                refresh_token_secret: SecretString::from(refresh_token_secret),
                access_token_ttl_secs: env_var_parse("JWT_EXPIRY_SECS", default_access_token_ttl()),
                refresh_token_ttl_secs: env_var_parse(
                    "REFRESH_TOKEN_EXPIRY_SECS",
                    default_refresh_token_ttl(),
                ),
                session_ttl_secs: env_var_parse("SESSION_TIMEOUT_SECS", default_session_ttl()),
                rotate_refresh_tokens: env_var_bool("REFRESH_TOKEN_ROTATION", true),
                max_refresh_tokens_per_user: env_var_parse(
                    "MAX_REFRESH_TOKENS_PER_USER",
                    default_max_refresh_tokens(),
                ),
            },
            lockout: LockoutConfig {
                max_login_attempts: env_var_parse(
                    "MAX_LOGIN_ATTEMPTS",
                    default_max_login_attempts(),
                ),
                lockout_duration_secs: env_var_parse(
                    "LOCKOUT_DURATION_SECS",
                    default_lockout_duration(),
                ),
            },
            rate_limit: RateLimitConfig {
                general: WindowLimit::new(
                    env_var_parse("RATE_LIMIT_WINDOW_MS", defaults.general.window_ms),
                    env_var_parse("RATE_LIMIT_MAX_REQUESTS", defaults.general.max_requests),
                ),
                auth: WindowLimit::new(
                    env_var_parse("RATE_LIMIT_AUTH_WINDOW_MS", defaults.auth.window_ms),
                    env_var_parse("RATE_LIMIT_MAX_AUTH_REQUESTS", defaults.auth.max_requests),
                ),
                refresh: WindowLimit::new(
                    env_var_parse("RATE_LIMIT_REFRESH_WINDOW_MS", defaults.refresh.window_ms),
                    env_var_parse(
                        "RATE_LIMIT_MAX_REFRESH_REQUESTS",
                        defaults.refresh.max_requests,
                    ),
                ),
            },
            sweep: SweepConfig::default(),
            password: PasswordPolicy::default(),
            logging: LoggingConfig {
                level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// 설정 값의 일관성을 검증합니다.
    pub fn validate(&self) -> CoreResult<()> {
        let access = self.tokens.access_token_secret.expose_secret();
        let refresh = self.tokens.refresh_token_secret.expose_secret();

        if access.len() < MIN_SECRET_LEN {
            return Err(CoreError::config(format!(
                "access token secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if refresh.len() < MIN_SECRET_LEN {
            return Err(CoreError::config(format!(
                "refresh token secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if access == refresh {
            return Err(CoreError::config(
                "access and refresh token secrets must differ",
            ));
        }

        let tokens = &self.tokens;
        if tokens.access_token_ttl_secs <= 0 || tokens.session_ttl_secs <= 0 {
            return Err(CoreError::config("token and session TTLs must be positive"));
        }
        if tokens.refresh_token_ttl_secs <= tokens.session_ttl_secs
            || tokens.refresh_token_ttl_secs <= tokens.access_token_ttl_secs
        {
            return Err(CoreError::config(
                "refresh token TTL must be longer than the session and access token TTLs",
            ));
        }
        if tokens.max_refresh_tokens_per_user == 0 {
            return Err(CoreError::config(
                "max_refresh_tokens_per_user must be at least 1",
            ));
        }

        for (name, secs) in [
            ("access_token_ttl_secs", tokens.access_token_ttl_secs),
            ("refresh_token_ttl_secs", tokens.refresh_token_ttl_secs),
            ("session_ttl_secs", tokens.session_ttl_secs),
            ("lockout_duration_secs", self.lockout.lockout_duration_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(CoreError::config(format!(
                    "{name} must not exceed {MAX_DURATION_SECS} seconds"
                )));
            }
        }

        if self.lockout.max_login_attempts == 0 || self.lockout.lockout_duration_secs <= 0 {
            return Err(CoreError::config(
                "lockout requires at least one attempt and a positive duration",
            ));
        }

        for (name, limit) in [
            ("general", self.rate_limit.general),
            ("auth", self.rate_limit.auth),
            ("refresh", self.rate_limit.refresh),
        ] {
            if limit.window_ms <= 0 || limit.max_requests == 0 {
                return Err(CoreError::config(format!(
                    "rate limit '{name}' needs a positive window and max_requests"
                )));
            }
            if limit.window_ms / 1000 > MAX_DURATION_SECS {
                return Err(CoreError::config(format!(
                    "rate limit '{name}' window must not exceed {MAX_DURATION_SECS} seconds"
                )));
            }
        }

        let sweep = &self.sweep;
        for (name, secs) in [
            ("session", sweep.session_interval_secs),
            ("rate_limit", sweep.rate_limit_interval_secs),
            ("login_attempt", sweep.login_attempt_interval_secs),
            ("refresh_token", sweep.refresh_token_interval_secs),
        ] {
            if secs == 0 || secs > MAX_DURATION_SECS as u64 {
                return Err(CoreError::config(format!(
                    "sweep interval '{name}' must be between 1 and {MAX_DURATION_SECS} seconds"
                )));
            }
        }

        Ok(())
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ACCESS_SECRET: &str = "access-secret-for-tests-at-least-32-bytes";
    const REFRESH_SECRET: &str = "refresh-secret-for-tests-at-least-32-bytes";

    fn valid_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.tokens.access_token_secret = SecretString::from(ACCESS_SECRET);
        config.tokens.refresh_token_secret = SecretString::from(REFRESH_SECRET);
        config
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.tokens.access_token_ttl(), Duration::hours(24));
        assert_eq!(config.tokens.refresh_token_ttl(), Duration::days(7));
        assert_eq!(config.tokens.session_ttl(), Duration::minutes(30));
        assert!(config.tokens.rotate_refresh_tokens);
        assert_eq!(config.tokens.max_refresh_tokens_per_user, 5);
        assert_eq!(config.lockout.max_login_attempts, 5);
        assert_eq!(config.lockout.lockout_duration(), Duration::minutes(15));
        assert_eq!(config.rate_limit.auth, WindowLimit::new(300_000, 10));
        assert_eq!(config.rate_limit.refresh, WindowLimit::new(60_000, 5));
        assert_eq!(config.rate_limit.general, WindowLimit::new(900_000, 100));
        assert_eq!(config.sweep.refresh_token_interval_secs, 600);
    }

    #[test]
    fn test_validate_accepts_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_secret() {
        let config = AuthConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shared_secret() {
        let mut config = valid_config();
        config.tokens.refresh_token_secret = SecretString::from(ACCESS_SECRET);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_validate_rejects_short_refresh_ttl() {
        let mut config = valid_config();
        config.tokens.refresh_token_ttl_secs = config.tokens.session_ttl_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_rate_limit() {
        let mut config = valid_config();
        config.rate_limit.auth.max_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unbounded_durations() {
        let mut config = valid_config();
        config.tokens.refresh_token_ttl_secs = i64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("refresh_token_ttl_secs"));

        let mut config = valid_config();
        config.lockout.lockout_duration_secs = MAX_DURATION_SECS + 1;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.rate_limit.general.window_ms = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.sweep.session_interval_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.tokens.refresh_token_ttl_secs = MAX_DURATION_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_accessors_never_overflow() {
        let mut config = valid_config();
        config.tokens.access_token_ttl_secs = i64::MAX;
        config.lockout.lockout_duration_secs = i64::MIN;
        config.rate_limit.auth.window_ms = i64::MAX;

        assert_eq!(
            config.tokens.access_token_ttl(),
            Duration::seconds(MAX_DURATION_SECS)
        );
        assert_eq!(config.lockout.lockout_duration(), Duration::zero());
        assert_eq!(
            config.rate_limit.auth.window(),
            Duration::seconds(MAX_DURATION_SECS)
        );
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[tokens]
access_token_secret = "{ACCESS_SECRET}"
refresh_token_secret = "{REFRESH_SECRET}"
rotate_refresh_tokens = false

[lockout]
max_login_attempts = 3

[rate_limit.auth]
window_ms = 60000
max_requests = 2
"#
        )
        .unwrap();

        let config = AuthConfig::load(file.path()).unwrap();
        assert!(!config.tokens.rotate_refresh_tokens);
        assert_eq!(config.lockout.max_login_attempts, 3);
        assert_eq!(config.lockout.lockout_duration_secs, 900);
        assert_eq!(config.rate_limit.auth, WindowLimit::new(60_000, 2));
        assert_eq!(config.rate_limit.refresh, WindowLimit::new(60_000, 5));
        assert_eq!(
            config.tokens.access_token_secret.expose_secret(),
            ACCESS_SECRET
        );
    }
}
