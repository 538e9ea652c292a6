//! 任务模型 - 任务种类、权重函数与轻量投影

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::identity::IdAllocator;
use crate::model::node::NodeInfo;

/// 任务种类
///
/// 闭合枚举：未知种类在类型层面不可表达，权重匹配必须穷尽。
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    Fibonacci,
    Eratosthenes,
    SquareSum,
}

/// 任务记录，创建后不可变
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Job {
    /// 全局唯一ID，创建时由同步计数器分配
    pub id: i32,
    /// 任务种类
    #[serde(rename = "type")]
    pub kind: JobKind,
    /// 任务输入参数
    pub input: i32,
}

impl Job {
    /// 创建新任务，ID取自调用方持有的分配器
    pub fn create(ids: &IdAllocator, kind: JobKind, input: i32) -> Self {
        Self {
            id: ids.assign(),
            kind,
            input,
        }
    }

    /// 估算计算代价（权重）
    ///
    /// 纯函数，每次按当前输入重新计算，绝不缓存。
    pub fn weight(&self) -> i64 {
        let input = self.input as f64;
        match self.kind {
            JobKind::Fibonacci => self.input as i64,
            JobKind::Eratosthenes => (input * input.ln()).ceil() as i64,
            JobKind::SquareSum => (self.input as i64) * (self.input as i64),
        }
    }

    /// 以指定归属节点生成轻量投影
    pub fn info(&self, owner: &NodeInfo) -> JobInfo {
        JobInfo {
            job_id: self.id,
            weight: self.weight(),
            owner: owner.clone(),
        }
    }
}

/// 任务轻量投影，用于均衡决策，不携带任务本体
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub job_id: i32,
    /// 提案时刻固定下来的权重
    pub weight: i64,
    pub owner: NodeInfo,
}

// 按权重降序排序（最重的在前），这是均衡器挑选迁移对象的依据
impl Ord for JobInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .weight
            .cmp(&self.weight)
            .then_with(|| self.job_id.cmp(&other.job_id))
            .then_with(|| self.owner.cmp(&other.owner))
    }
}

impl PartialOrd for JobInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
