//! Errors - エラー型と分類
//!
//! # 分類
//! - Transient: 一時的なエラー（CL ストアや Run サブシステムの障害）。タスクごとリトライ
//! - Permanent: リトライしても変わらないエラー（全アクション失敗など）
//! - Invariant: プログラムのバグ。リトライせず、テストで大きく失敗させる

use crate::domain::ids::ClId;

/// 深刻度の昇順に並ぶ
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Invariant,
}

/// PortError は外部コラボレーター（port 実装）が返すエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    #[error("{service} rejected the request: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },
}

impl PortError {
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            message: message.into(),
        }
    }

    pub fn rejected(service: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected {
            service,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Port(#[from] PortError),

    #[error("triage of component {component} failed: {message}")]
    Triage { component: String, message: String },

    #[error("all {failed} actions failed, most severe: {worst}")]
    AllActionsFailed {
        failed: usize,
        worst: Box<EngineError>,
    },

    #[error("config {hash} of project {project} not found")]
    ConfigNotFound { project: String, hash: String },

    #[error("active {0} is still not loaded")]
    ActiveClNotLoaded(ClId),

    #[error("state was already cloned and must not be reused")]
    StateReused,

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Port(PortError::Unavailable { .. }) => ErrorKind::Transient,
            EngineError::Port(PortError::Rejected { .. }) => ErrorKind::Permanent,
            EngineError::Triage { .. } => ErrorKind::Permanent,
            EngineError::AllActionsFailed { worst, .. } => worst.kind(),
            EngineError::ConfigNotFound { .. } => ErrorKind::Transient,
            EngineError::ActiveClNotLoaded(_)
            | EngineError::StateReused
            | EngineError::Invariant(_) => ErrorKind::Invariant,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// 最も深刻なエラーを選ぶ（同じ深刻度なら先に現れたもの）
    pub fn most_severe(errs: impl IntoIterator<Item = EngineError>) -> Option<EngineError> {
        errs.into_iter().reduce(|worst, e| if e.kind() > worst.kind() { e } else { worst })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::store_down(EngineError::from(PortError::unavailable("cl store", "timeout")), ErrorKind::Transient)]
    #[case::rejected(EngineError::from(PortError::rejected("runs", "stale")), ErrorKind::Permanent)]
    #[case::reuse(EngineError::StateReused, ErrorKind::Invariant)]
    #[case::not_loaded(EngineError::ActiveClNotLoaded(ClId(1)), ErrorKind::Invariant)]
    #[case::all_failed_takes_worst(
        EngineError::AllActionsFailed {
            failed: 2,
            worst: Box::new(EngineError::from(PortError::unavailable("runs", "down"))),
        },
        ErrorKind::Transient
    )]
    fn classifies_errors(#[case] err: EngineError, #[case] expected: ErrorKind) {
        assert_eq!(err.kind(), expected);
        assert_eq!(err.is_retriable(), expected == ErrorKind::Transient);
    }

    #[test]
    fn most_severe_prefers_invariant_then_first_seen() {
        let errs = vec![
            EngineError::from(PortError::unavailable("runs", "a")),
            EngineError::from(PortError::rejected("runs", "b")),
            EngineError::from(PortError::rejected("runs", "c")),
        ];
        let worst = EngineError::most_severe(errs).unwrap();
        assert_eq!(worst.to_string(), "runs rejected the request: b");

        let errs = vec![EngineError::StateReused, EngineError::from(PortError::rejected("runs", "b"))];
        assert!(matches!(EngineError::most_severe(errs), Some(EngineError::StateReused)));
        assert!(EngineError::most_severe(Vec::new()).is_none());
    }
}
