//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock から timestamp を取り、ランダム部分と合わせて ULID を作る

use crate::domain::ids::{AttemptId, RecordId, TaskId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は時刻でソート可能な ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数タスクから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;

    fn generate_attempt_id(&self) -> AttemptId;

    fn generate_record_id(&self) -> RecordId;
}

/// ULID ベースの ID 生成器
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }

    fn generate_attempt_id(&self) -> AttemptId {
        AttemptId::from(self.next_ulid())
    }

    fn generate_record_id(&self) -> RecordId {
        RecordId::from(self.next_ulid())
    }
}
