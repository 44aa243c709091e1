//! 만료 레코드 백그라운드 정리.
//!
//! 네 개의 독립 타이머로 세션, 요청 한도 윈도우, 로그인 시도 기록,
//! Refresh Token을 정리합니다. 요청 처리와 분리되어 있으며 각 정리는
//! 저장소의 샤드/키 단위 삭제를 사용합니다.

use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use warden_core::SweepConfig;

use crate::login_guard::LoginAttemptGuard;
use crate::rate_limit::RateLimiter;
use crate::refresh::RefreshTokenManager;
use crate::session::SessionManager;

/// 한 번의 정리 결과.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// 삭제된 세션 수
    pub sessions: usize,
    /// 삭제된 요청 한도 윈도우 수
    pub rate_limit_windows: usize,
    /// 삭제된 로그인 시도 기록 수
    pub login_attempts: usize,
    /// 삭제된 Refresh Token 수
    pub refresh_tokens: usize,
}

impl SweepReport {
    /// 전체 삭제 수.
    pub fn total(&self) -> usize {
        self.sessions + self.rate_limit_windows + self.login_attempts + self.refresh_tokens
    }
}

/// 정리 작업.
#[derive(Debug, Clone)]
pub struct Sweeper {
    sessions: SessionManager,
    rate_limiter: RateLimiter,
    login_guard: LoginAttemptGuard,
    refresh_tokens: RefreshTokenManager,
    config: SweepConfig,
}

impl Sweeper {
    /// 새 정리 작업 생성.
    pub fn new(
        sessions: SessionManager,
        rate_limiter: RateLimiter,
        login_guard: LoginAttemptGuard,
        refresh_tokens: RefreshTokenManager,
        config: SweepConfig,
    ) -> Self {
        Self {
            sessions,
            rate_limiter,
            login_guard,
            refresh_tokens,
            config,
        }
    }

    /// 모든 저장소를 즉시 한 번 정리.
    pub fn run_once(&self) -> SweepReport {
        SweepReport {
            sessions: self.sessions.sweep(),
            rate_limit_windows: self.rate_limiter.sweep(),
            login_attempts: self.login_guard.sweep(),
            refresh_tokens: self.refresh_tokens.sweep(),
        }
    }

    /// 메인 루프.
    ///
    /// `shutdown`이 취소될 때까지 저장소별 주기로 정리합니다.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut session_ticker = ticker(self.config.session_interval());
        let mut rate_limit_ticker = ticker(self.config.rate_limit_interval());
        let mut login_attempt_ticker = ticker(self.config.login_attempt_interval());
        let mut refresh_token_ticker = ticker(self.config.refresh_token_interval());

        tracing::info!(
            session_interval_secs = self.config.session_interval_secs,
            refresh_token_interval_secs = self.config.refresh_token_interval_secs,
            "Sweeper started"
        );

        loop {
            tokio::select! {
                _ = session_ticker.tick() => {
                    self.sessions.sweep();
                }

                _ = rate_limit_ticker.tick() => {
                    self.rate_limiter.sweep();
                }

                _ = login_attempt_ticker.tick() => {
                    self.login_guard.sweep();
                }

                _ = refresh_token_ticker.tick() => {
                    self.refresh_tokens.sweep();
                }

                _ = shutdown.cancelled() => {
                    tracing::info!("Sweeper stopped");
                    break;
                }
            }
        }
    }

    /// 백그라운드 task로 시작.
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }
}

/// 첫 틱이 한 주기 뒤에 오는 타이머.
fn ticker(period: Duration) -> tokio::time::Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;
    use warden_core::{LockoutConfig, ManualClock, RateLimitConfig};

    use crate::gate::Identity;
    use crate::rate_limit::RateLimitCategory;
    use crate::roles::Role;
    use crate::session::ClientInfo;

    struct Parts {
        clock: Arc<ManualClock>,
        sessions: SessionManager,
        sweeper: Sweeper,
    }

    fn parts() -> Parts {
        let clock = Arc::new(ManualClock::starting_now());
        let sessions = SessionManager::new(ChronoDuration::minutes(30), clock.clone());
        let rate_limiter = RateLimiter::new(RateLimitConfig::default(), clock.clone());
        let login_guard = LoginAttemptGuard::new(LockoutConfig::default(), clock.clone());
        let refresh_tokens = RefreshTokenManager::new(ChronoDuration::days(7), 5, clock.clone());

        let identity = Identity::new("u1", "alice", Role::Admin);
        let session = sessions.create(&identity, ClientInfo::default());
        refresh_tokens.mint(&identity, &session.id);
        rate_limiter.check("10.0.0.1", RateLimitCategory::Refresh);
        login_guard.record("alice", false);

        let sweeper = Sweeper::new(
            sessions.clone(),
            rate_limiter,
            login_guard,
            refresh_tokens,
            SweepConfig::default(),
        );
        Parts {
            clock,
            sessions,
            sweeper,
        }
    }

    #[test]
    fn test_run_once_reports_each_store() {
        let p = parts();
        assert_eq!(p.sweeper.run_once().total(), 0);

        p.clock.advance(ChronoDuration::minutes(31));
        let report = p.sweeper.run_once();
        assert_eq!(
            report,
            SweepReport {
                sessions: 1,
                rate_limit_windows: 1,
                login_attempts: 1,
                refresh_tokens: 0,
            }
        );

        p.clock.advance(ChronoDuration::days(7));
        assert_eq!(p.sweeper.run_once().refresh_tokens, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_on_interval() {
        let p = parts();
        p.clock.advance(ChronoDuration::minutes(31));
        assert_eq!(p.sessions.len(), 1);

        let shutdown = CancellationToken::new();
        let handle = p.sweeper.clone().spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(p.sessions.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
