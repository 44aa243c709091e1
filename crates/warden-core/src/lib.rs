//! # Warden Core
//!
//! 관리자 API 인증 코어가 공통으로 사용하는 기반 타입을 제공합니다.
//!
//! - 설정 관리 (토큰 TTL, 잠금 정책, 요청 한도, 정리 주기)
//! - 주입 가능한 시계 (테스트에서 시간 경과를 결정적으로 시뮬레이션)
//! - 코어 에러 타입
//! - 로깅 인프라

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::*;
pub use error::*;
pub use logging::*;
