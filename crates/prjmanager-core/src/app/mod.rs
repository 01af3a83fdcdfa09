//! App - アプリケーション層
//!
//! このモジュールは、ports と state エンジンを組み合わせて
//! プロジェクトごとのイベント処理を提供します。
//!
//! # 主要コンポーネント
//! - **ProjectManagerBuilder**: ProjectManager の構築とワイヤリング
//! - **ProjectManager**: イベントのバッチ処理、保存後の副作用の実行
//! - **EngineConfig**: 並列数・期限・tick などの設定

pub mod builder;
pub mod config;
pub mod manager;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, ProjectManagerBuilder};
pub use self::config::EngineConfig;
pub use self::manager::{Outcome, ProjectManager};
