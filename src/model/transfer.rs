//! 任务迁移值对象

use serde::{Deserialize, Serialize};

use crate::model::job::JobInfo;
use crate::model::node::NodeInfo;

/// 一次任务迁移：把权重在提案时刻固定的任务从捐出方移到接收方
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct JobTransfer {
    pub job: JobInfo,
    pub donor: NodeInfo,
    pub recipient: NodeInfo,
}

impl JobTransfer {
    pub fn new(job: JobInfo, donor: NodeInfo, recipient: NodeInfo) -> Self {
        Self {
            job,
            donor,
            recipient,
        }
    }
}

/// 均衡结果：按执行顺序排列的迁移列表
///
/// 后面的迁移提案是基于前面提案更新后的运行时负载计算的，
/// 乱序重放会得到不一致的最终分布。
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancingResult {
    pub job_transfers: Vec<JobTransfer>,
}

impl LoadBalancingResult {
    pub fn new(job_transfers: Vec<JobTransfer>) -> Self {
        Self { job_transfers }
    }

    pub fn is_empty(&self) -> bool {
        self.job_transfers.is_empty()
    }
}
