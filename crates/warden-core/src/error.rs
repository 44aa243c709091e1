//! 코어 에러 타입.

use thiserror::Error;

/// 설정 로드 및 검증 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 파일/환경 변수 로드 실패
    #[error("설정 로드 실패: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// 설정 값 검증 실패
    #[error("설정 에러: {0}")]
    Config(String),

    /// 로깅 초기화 실패
    #[error("로깅 초기화 실패: {0}")]
    Logging(String),
}

/// 코어 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// 설정 에러 생성 헬퍼.
    pub fn config(message: impl Into<String>) -> Self {
        CoreError::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = CoreError::config("jwt secret is empty");
        assert_eq!(err.to_string(), "설정 에러: jwt secret is empty");
    }
}
