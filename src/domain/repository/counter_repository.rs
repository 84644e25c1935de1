use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entity::counter::CounterRow;
use crate::domain::period::PeriodType;

/// history のデフォルト取得件数。
pub const DEFAULT_HISTORY_LIMIT: i64 = 100;

/// CounterRepository はピリオド別リクエストカウンターの永続化を担当する。
///
/// 行はエンジンからは削除されず、過去ピリオドの行は履歴としてそのまま残る。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CounterRepository: Send + Sync {
    /// 一意キー (user_id, period_type, period_start) の request_count を返す。
    /// 行が存在しない場合は 0 を返し、エラーにはしない。
    async fn get_count(
        &self,
        user_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
    ) -> anyhow::Result<i64>;

    /// 行があれば request_count を 1 加算し、無ければ request_count = 1 で
    /// 挿入する。加算後の request_count を返す。
    /// 同一キーへの同時呼び出しに対して安全でなければならない。
    async fn increment_or_insert(
        &self,
        user_id: &str,
        period_type: PeriodType,
        period_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<i64>;

    /// (user_id, period_type) の行を period_start 降順で最大 limit 件返す。
    async fn history(
        &self,
        user_id: &str,
        period_type: PeriodType,
        limit: i64,
    ) -> anyhow::Result<Vec<CounterRow>>;
}
