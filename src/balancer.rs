//! 负载均衡算法模块
//!
//! 贪心的兄弟组均衡：负载超出组平均值加容差的节点作为捐出方，
//! 按负载降序依次处理；每次把捐出方最重的可行任务迁给当前最轻的
//! 低于平均值的节点，并实时更新双方的运行时负载。后面的提案基于
//! 更新后的负载计算，因此结果列表的顺序即执行顺序。
//!
//! 可行性约束：迁移后接收方负载必须仍严格低于捐出方迁移前负载
//! (`recipient + w < donor`)。该约束保证把结果套用回同一快照后
//! 算法已到达不动点，第二次运行必然得到空列表。

use log::debug;

use crate::model::job::JobInfo;
use crate::model::node::NodeInfo;
use crate::model::transfer::JobTransfer;

/// 均衡输入：一个节点及其持有任务的投影
#[derive(Debug, Clone)]
pub struct NodeLoad {
    pub node: NodeInfo,
    pub jobs: Vec<JobInfo>,
}

impl NodeLoad {
    pub fn new(node: NodeInfo, jobs: Vec<JobInfo>) -> Self {
        Self { node, jobs }
    }

    /// 节点负载 = 持有任务权重之和
    pub fn load(&self) -> f64 {
        self.jobs.iter().map(|j| j.weight as f64).sum()
    }
}

// 运行时工作副本，任务保持权重降序
struct Running {
    node: NodeInfo,
    jobs: Vec<JobInfo>,
    load: f64,
    done: bool,
}

/// 计算把兄弟组负载拉回容差内的最小迁移序列
///
/// 单节点组恒为空结果；无节点超出容差时同样为空。
/// 任务不可拆分：单个任务重于整个失衡量时仍整体迁移。
pub fn balance(group: &[NodeLoad], tolerance: f64) -> Vec<JobTransfer> {
    if group.len() <= 1 {
        return Vec::new();
    }

    let mut running: Vec<Running> = group
        .iter()
        .map(|nl| {
            let mut jobs = nl.jobs.clone();
            jobs.sort(); // JobInfo排序即权重降序
            Running {
                node: nl.node.clone(),
                load: nl.load(),
                jobs,
                done: false,
            }
        })
        .collect();

    let average = running.iter().map(|r| r.load).sum::<f64>() / running.len() as f64;
    debug!("balancing group of {}, average load {average}", group.len());

    let mut transfers = Vec::new();

    // 捐出方可能过度捐出而落到平均值之下，给先前处理完的捐出方
    // 重新创造可行迁移；整体迭代到不动点为止。可行性约束使负载
    // 平方和每次迁移严格下降，迭代必然终止。
    loop {
        let before = transfers.len();
        run_pass(&mut running, &mut transfers, average, tolerance);
        if transfers.len() == before {
            break;
        }
        for r in running.iter_mut() {
            r.done = false;
        }
    }

    transfers
}

fn run_pass(
    running: &mut [Running],
    transfers: &mut Vec<JobTransfer>,
    average: f64,
    tolerance: f64,
) {
    // 每轮取当前负载最高、尚未处理完的捐出方
    while let Some(donor) = pick_donor(running, average, tolerance) {
        loop {
            if running[donor].load <= average + tolerance {
                break;
            }
            let Some(recipient) = pick_recipient(running, donor, average) else {
                break; // 没有低于平均值的接收方
            };

            // 从最重的任务开始找可行迁移
            let feasible = running[donor]
                .jobs
                .iter()
                .position(|j| running[recipient].load + (j.weight as f64) < running[donor].load);
            let Some(at) = feasible else {
                break;
            };

            let job = running[donor].jobs.remove(at);
            running[donor].load -= job.weight as f64;
            running[recipient].load += job.weight as f64;
            debug!(
                "proposing job {} ({} -> {})",
                job.job_id, running[donor].node, running[recipient].node
            );
            // 捐出方记录任务的实际持有者：组成员可能是一棵子树的
            // 根，任务本体未必在它手里
            let holder = job.owner.clone();
            transfers.push(JobTransfer::new(
                job,
                holder,
                running[recipient].node.clone(),
            ));
        }
        running[donor].done = true;
    }
}

fn pick_donor(running: &[Running], average: f64, tolerance: f64) -> Option<usize> {
    running
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.done && r.load > average + tolerance)
        .max_by(|(_, a), (_, b)| a.load.total_cmp(&b.load))
        .map(|(i, _)| i)
}

fn pick_recipient(running: &[Running], donor: usize, average: f64) -> Option<usize> {
    running
        .iter()
        .enumerate()
        .filter(|&(i, r)| i != donor && r.load < average)
        .min_by(|(_, a), (_, b)| a.load.total_cmp(&b.load))
        .map(|(i, _)| i)
}
