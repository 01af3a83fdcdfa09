//! IdGenerator port - Run ID 生成の抽象化
//!
//! Run ID は Run の中身から決まります。コミットされなかった pass が
//! やり直されても同じ ID で作成依頼が出るので、Run サブシステム側で重複を除けます。
//!
//! # 実装
//! - **DigestIdGenerator**: RunKey の SHA-256 から作る ULID（本番用）

use crate::domain::RunKey;
use crate::domain::ids::RunId;
use ulid::Ulid;

/// IdGenerator は Run ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（Run 作成の並列実行から使う）
///
/// 同じ key には必ず同じ ID を返すこと。
pub trait IdGenerator: Send + Sync {
    fn run_id(&self, key: &RunKey<'_>) -> RunId;
}

/// DigestIdGenerator は RunKey から決定的に ULID を作る
///
/// 時刻部は最後の投票時刻なので、Run ID はおおよそ投票順に並びます。
/// 乱数部は RunKey の digest の先頭 80 bit です。
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestIdGenerator;

impl IdGenerator for DigestIdGenerator {
    fn run_id(&self, key: &RunKey<'_>) -> RunId {
        let timestamp_ms = key
            .latest_trigger_time()
            .map_or(0, |t| t.timestamp_millis().max(0) as u64);
        let digest = key.digest();
        let mut random = [0u8; 16];
        random[6..].copy_from_slice(&digest[..10]);
        RunId::from(Ulid::from_parts(timestamp_ms, u128::from_be_bytes(random)))
    }
}
