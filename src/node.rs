//! 节点协议状态机模块
//!
//! 每个工作节点持有一个[`NodeEngine`]：任务队列、自己在层级树中
//! 的视图、进行中的聚合轮次和迁移应用状态。引擎只消费和产出
//! 已解码的[`Message`]，传输层在边界之外——对端送来什么消息就
//! 调用[`NodeEngine::handle`]，返回的出站消息由调用方投递。
//! 聚合期限靠[`NodeEngine::tick`]推进。

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Instant;

use log::{debug, info, warn};

use crate::balancer::{balance, NodeLoad};
use crate::collector::Collector;
use crate::config::EngineConfig;
use crate::message::Message;
use crate::model::job::{Job, JobInfo};
use crate::model::node::{LoadInfo, NodeInfo};
use crate::model::transfer::{JobTransfer, LoadBalancingResult};
use crate::model::tree::TreeNode;
use crate::tree::TreeArena;
use crate::{ProtocolError, Result, TransferError};

/// 待投递的出站消息
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub dest: NodeInfo,
    pub message: Message,
}

impl Outbound {
    fn new(dest: NodeInfo, message: Message) -> Self {
        Self { dest, message }
    }
}

// 一轮进行中的任务清点
struct Round {
    collector: Collector<NodeInfo, Vec<JobInfo>>,
    expected: Vec<NodeInfo>,
    deadline: Instant,
}

/// 节点协议状态机
pub struct NodeEngine {
    info: NodeInfo,
    config: EngineConfig,
    queue: VecDeque<Job>,
    view: Option<TreeNode>,
    child_loads: BTreeMap<NodeInfo, f64>,
    roster: Vec<NodeInfo>,
    round: Option<Round>,
    // 收尾后的子树清单留存一轮，结果抵达时用来对子节点组再平衡
    last_reports: HashMap<NodeInfo, Vec<JobInfo>>,
    pending_batches: usize,
    pending_deadline: Option<Instant>,
    last_balance: Option<Instant>,
    last_reported_load: Option<f64>,
    degraded_rounds: u64,
    stale_transfers: u64,
}

impl NodeEngine {
    pub fn new(info: NodeInfo, config: EngineConfig) -> Self {
        Self {
            info,
            config,
            queue: VecDeque::new(),
            view: None,
            child_loads: BTreeMap::new(),
            roster: Vec::new(),
            round: None,
            last_reports: HashMap::new(),
            pending_batches: 0,
            pending_deadline: None,
            last_balance: None,
            last_reported_load: None,
            degraded_rounds: 0,
            stale_transfers: 0,
        }
    }

    /// 本节点身份
    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    /// 当前层级视图
    pub fn view(&self) -> Option<&TreeNode> {
        self.view.as_ref()
    }

    /// 已通报身份的节点清单，按ID升序
    pub fn roster(&self) -> &[NodeInfo] {
        &self.roster
    }

    /// 当前是否处于均衡流程中：有未收尾的清点轮次或在等任务移交
    pub fn is_balancing(&self) -> bool {
        self.round.is_some() || self.pending_batches > 0
    }

    /// 当前持有的任务数
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// 本节点瞬时负载：持有任务的权重之和
    pub fn current_load(&self) -> f64 {
        self.queue.iter().map(|j| j.weight() as f64).sum()
    }

    /// 降级轮次累计
    pub fn degraded_rounds(&self) -> u64 {
        self.degraded_rounds
    }

    /// 过期迁移累计
    pub fn stale_transfers(&self) -> u64 {
        self.stale_transfers
    }

    fn own_jobs(&self) -> Vec<JobInfo> {
        self.queue.iter().map(|j| j.info(&self.info)).collect()
    }

    /// 处理一条已解码的入站消息，返回需要投递的出站消息
    pub fn handle(&mut self, message: Message, now: Instant) -> Result<Vec<Outbound>> {
        match message {
            Message::BuildHierarchy {
                branching_factor,
                nodes,
            } => self.build_hierarchy(branching_factor, nodes),

            Message::Hierarchy(tree) => {
                info!("{} got its hierarchy view", self.info);
                self.adopt_view(tree);
                Ok(Vec::new())
            }

            Message::SendNodeInfo { node } => {
                if !self.roster.contains(&node) {
                    self.roster.push(node);
                    self.roster.sort();
                }
                Ok(Vec::new())
            }

            Message::DoWork { job } => {
                debug!("{} queued job {}", self.info, job.id);
                self.queue.push_back(job);
                Ok(Vec::new())
            }

            Message::LoadInfo(update) => {
                debug!("{} got a load update: {} = {}", self.info, update.node, update.load);
                self.child_loads.insert(update.node, update.load);
                Ok(Vec::new())
            }

            Message::CollectJobs { .. } => self.start_collection(now),

            Message::JobInfoList { sender, jobs } => self.accept_report(sender, jobs, now),

            Message::LoadBalancingResult(result) => {
                let mut outbound = self.apply_result(&result.job_transfers, now);
                outbound.extend(self.rebalance_children(now));
                Ok(outbound)
            }

            Message::JobTransferRequest { transfers } => Ok(self.donate_jobs(&transfers)),

            Message::JobBatch { jobs } => {
                for job in jobs {
                    self.queue.push_back(job);
                }
                self.pending_batches = self.pending_batches.saturating_sub(1);
                if self.pending_batches == 0 {
                    self.pending_deadline = None;
                    self.last_balance = Some(now);
                }
                Ok(Vec::new())
            }

            Message::Log { text } => {
                info!("remote: {text}");
                Ok(Vec::new())
            }

            Message::Response { text } => {
                debug!("{} got a response: {text}", self.info);
                Ok(Vec::new())
            }

            // 控制器边界的消息，工作节点收到只记录不处理
            Message::SpinUpRequest { .. }
            | Message::KillRequest
            | Message::NodeOnline { .. }
            | Message::NodesSpawned { .. } => {
                warn!("{} ignoring controller-boundary message", self.info);
                Ok(Vec::new())
            }
        }
    }

    /// 推进一个工作周期：向父节点上报子树负载，作废到期未应答的
    /// 移交请求，到期的清点轮次带着缺口降级收尾
    pub fn tick(&mut self, now: Instant) -> Vec<Outbound> {
        let mut outbound = Vec::new();

        // 捐出方失联时不能一直等，作废后下一均衡周期自愈
        if let Some(deadline) = self.pending_deadline {
            if now >= deadline {
                warn!(
                    "{}: {} transfer request(s) went unanswered, abandoning them",
                    self.info, self.pending_batches
                );
                self.pending_batches = 0;
                self.pending_deadline = None;
            }
        }

        outbound.extend(self.report_load());

        let due = self.round.as_ref().is_some_and(|r| now >= r.deadline);
        if due {
            if let Some(mut round) = self.round.take() {
                round.collector.drain();
                let reported: HashSet<NodeInfo> =
                    round.collector.reported_keys().cloned().collect();
                for child in &round.expected {
                    if !reported.contains(child) {
                        warn!(
                            "{}: child {child} missed the collect deadline, its jobs are lost this round",
                            self.info
                        );
                    }
                }
                self.degraded_rounds += 1;
                outbound.extend(self.finish_round(round, now));
            }
        }

        outbound
    }

    // 子树负载 = 自身负载 + 子节点自报负载之和，变化时上报父节点
    fn report_load(&mut self) -> Vec<Outbound> {
        let Some(parent) = self.view.as_ref().and_then(|v| v.parent.clone()) else {
            return Vec::new();
        };
        let load = self.current_load() + self.child_loads.values().sum::<f64>();
        if self.last_reported_load == Some(load) {
            return Vec::new();
        }
        self.last_reported_load = Some(load);
        vec![Outbound::new(
            parent,
            Message::LoadInfo(LoadInfo::new(self.info.clone(), load)),
        )]
    }

    /// 若到达均衡周期且观测到失衡，由根节点发起一轮清点
    pub fn maybe_balance(&mut self, now: Instant) -> Result<Vec<Outbound>> {
        let Some(view) = &self.view else {
            return Ok(Vec::new());
        };
        if !view.is_root() || self.is_balancing() {
            return Ok(Vec::new());
        }
        if let Some(last) = self.last_balance {
            if now.duration_since(last) < self.config.min_balance_interval {
                return Ok(Vec::new());
            }
        }
        if !self.check_imbalance() {
            return Ok(Vec::new());
        }
        info!("{} triggering a load balancing round", self.info);
        self.start_collection(now)
    }

    // 根据子节点自报负载和自身负载判断是否失衡
    fn check_imbalance(&self) -> bool {
        let mut loads: Vec<f64> = self.child_loads.values().copied().collect();
        loads.push(self.current_load());
        if loads.len() <= 1 {
            return false;
        }
        let average = loads.iter().sum::<f64>() / loads.len() as f64;
        loads
            .iter()
            .any(|load| (load - average).abs() > self.config.imbalance_tolerance)
    }

    fn build_hierarchy(
        &mut self,
        branching_factor: u32,
        nodes: Vec<NodeInfo>,
    ) -> Result<Vec<Outbound>> {
        let arena = TreeArena::build(branching_factor, nodes)?;
        info!(
            "{} built a hierarchy of {} nodes, branching factor {branching_factor}",
            self.info,
            arena.len()
        );

        let mut outbound = Vec::new();
        for index in 0..arena.len() {
            let subtree = arena.subtree(index);
            if arena.node(index) == &self.info {
                self.adopt_view(subtree);
            } else {
                outbound.push(Outbound::new(arena.node(index).clone(), Message::Hierarchy(subtree)));
            }
        }
        Ok(outbound)
    }

    fn adopt_view(&mut self, tree: TreeNode) {
        self.child_loads = tree.child_nodes().into_iter().map(|n| (n, 0.0)).collect();
        self.round = None;
        self.last_reports.clear();
        self.pending_batches = 0;
        self.pending_deadline = None;
        self.last_reported_load = None;
        self.view = Some(tree);
    }

    // 清点阶段的扇出：叶子直接向父节点汇报，内部节点先等子节点
    fn start_collection(&mut self, now: Instant) -> Result<Vec<Outbound>> {
        let view = self.view.as_ref().ok_or(ProtocolError::NoHierarchy)?;

        // 已有进行中的轮次时不重开，否则在途的收集器会被顶掉
        if self.round.is_some() {
            warn!(
                "{}: a collection round is already open, ignoring the new request",
                self.info
            );
            return Ok(Vec::new());
        }

        if view.is_leaf() {
            let Some(parent) = view.parent.clone() else {
                // 单节点树，无事可做
                return Ok(Vec::new());
            };
            debug!("{} is a leaf, reporting its own jobs", self.info);
            return Ok(vec![Outbound::new(
                parent,
                Message::JobInfoList {
                    sender: self.info.clone(),
                    jobs: self.own_jobs(),
                },
            )]);
        }

        let children = view.child_nodes();
        let collector = Collector::new(children.len());
        self.round = Some(Round {
            collector,
            expected: children.clone(),
            deadline: now + self.config.collect_timeout,
        });

        Ok(children
            .into_iter()
            .map(|child| Outbound::new(child, Message::collect_jobs()))
            .collect())
    }

    fn accept_report(
        &mut self,
        sender: NodeInfo,
        jobs: Vec<JobInfo>,
        now: Instant,
    ) -> Result<Vec<Outbound>> {
        let Some(round) = self.round.as_mut() else {
            // 降级轮次收尾后迟到的汇报，不算协议违规
            warn!("{}: late report from {sender}, the round is already over", self.info);
            return Ok(Vec::new());
        };
        if !round.expected.contains(&sender) {
            return Err(ProtocolError::UnexpectedReport(sender.to_string()));
        }

        round.collector.add(sender, jobs);
        round.collector.drain();
        if round.collector.is_complete() {
            if let Some(round) = self.round.take() {
                return Ok(self.finish_round(round, now));
            }
        }
        Ok(Vec::new())
    }

    // 扇入收尾：非根节点把并集上报，根节点直接进入均衡
    fn finish_round(&mut self, round: Round, now: Instant) -> Vec<Outbound> {
        let expected = round.expected;
        let reports = round.collector.into_reports();

        let is_root = self
            .view
            .as_ref()
            .map(|v| v.is_root())
            .unwrap_or(false);

        if !is_root {
            let mut merged = self.own_jobs();
            for jobs in reports.values() {
                merged.extend(jobs.iter().cloned());
            }
            // 留存子树清单：均衡结果传下来时还要对子节点组再平衡
            self.last_reports = reports;
            let parent = self
                .view
                .as_ref()
                .and_then(|v| v.parent.clone());
            return match parent {
                Some(parent) => vec![Outbound::new(
                    parent,
                    Message::JobInfoList {
                        sender: self.info.clone(),
                        jobs: merged,
                    },
                )],
                None => Vec::new(),
            };
        }

        // 根节点：兄弟组 = 已汇报子节点的子树清单 + 自己的任务。
        // 错过期限的子节点按失联处理，其子树本轮不参与均衡。
        let mut group: Vec<NodeLoad> = Vec::with_capacity(expected.len() + 1);
        group.push(NodeLoad::new(self.info.clone(), self.own_jobs()));
        let mut reported = HashSet::new();
        for child in &expected {
            if let Some(jobs) = reports.get(child) {
                group.push(NodeLoad::new(child.clone(), jobs.clone()));
                reported.insert(child.clone());
            }
        }

        let transfers = balance(&group, self.config.imbalance_tolerance);
        info!("{} computed {} transfers", self.info, transfers.len());
        self.last_balance = Some(now);

        self.distribute_transfers(transfers, self.internal_children(&reported), now)
    }

    // 视图中已汇报且自身还有子节点的孩子，均衡结果要继续传给它们
    fn internal_children(&self, reported: &HashSet<NodeInfo>) -> Vec<NodeInfo> {
        self.view
            .as_ref()
            .map(|view| {
                view.children
                    .iter()
                    .filter(|c| !c.is_leaf() && reported.contains(&c.node))
                    .map(|c| c.node.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    // 把迁移提案分发给捐出方和接收方；内部子节点即使没分到迁移
    // 也要收到结果，它们拿到结果后对自己的子节点组再平衡一层
    fn distribute_transfers(
        &mut self,
        transfers: Vec<JobTransfer>,
        propagate_to: Vec<NodeInfo>,
        now: Instant,
    ) -> Vec<Outbound> {
        let mut per_node: BTreeMap<NodeInfo, Vec<JobTransfer>> = BTreeMap::new();
        for transfer in &transfers {
            per_node
                .entry(transfer.donor.clone())
                .or_default()
                .push(transfer.clone());
            if transfer.recipient != transfer.donor {
                per_node
                    .entry(transfer.recipient.clone())
                    .or_default()
                    .push(transfer.clone());
            }
        }
        for child in propagate_to {
            per_node.entry(child).or_default();
        }

        let mut outbound = Vec::new();
        let mut own_share = Vec::new();
        for (node, share) in per_node {
            if node == self.info {
                own_share = share;
            } else {
                outbound.push(Outbound::new(
                    node,
                    Message::LoadBalancingResult(LoadBalancingResult::new(share)),
                ));
            }
        }
        outbound.extend(self.apply_result(&own_share, now));
        outbound
    }

    // 均衡逐层下行：内部节点收到结果后，用上一轮留存的子树清单
    // 对自己的子节点组再平衡，并把结果继续传给更深的内部节点
    fn rebalance_children(&mut self, now: Instant) -> Vec<Outbound> {
        let reports = std::mem::take(&mut self.last_reports);
        if reports.is_empty() {
            return Vec::new();
        }
        let Some(view) = &self.view else {
            return Vec::new();
        };

        let mut group = vec![NodeLoad::new(self.info.clone(), self.own_jobs())];
        let mut reported = HashSet::new();
        for child in view.child_nodes() {
            if let Some(jobs) = reports.get(&child) {
                group.push(NodeLoad::new(child.clone(), jobs.clone()));
                reported.insert(child);
            }
        }

        let transfers = balance(&group, self.config.imbalance_tolerance);
        debug!(
            "{} re-balanced its children group: {} transfers",
            self.info,
            transfers.len()
        );
        self.distribute_transfers(transfers, self.internal_children(&reported), now)
    }

    // 处理分到自己头上的均衡结果：作为接收方主动向捐出方索要任务，
    // 作为捐出方等待索要请求即可
    fn apply_result(&mut self, transfers: &[JobTransfer], now: Instant) -> Vec<Outbound> {
        let mut by_donor: BTreeMap<NodeInfo, Vec<JobTransfer>> = BTreeMap::new();
        let mut donating = false;
        for transfer in transfers {
            if transfer.recipient == self.info {
                by_donor
                    .entry(transfer.donor.clone())
                    .or_default()
                    .push(transfer.clone());
            } else if transfer.donor == self.info {
                donating = true;
            }
        }

        if by_donor.is_empty() {
            if !donating {
                self.last_balance = Some(now);
            }
            return Vec::new();
        }

        self.pending_batches += by_donor.len();
        self.pending_deadline = Some(now + self.config.collect_timeout);
        by_donor
            .into_iter()
            .map(|(donor, transfers)| {
                Outbound::new(donor, Message::JobTransferRequest { transfers })
            })
            .collect()
    }

    // 捐出方应答：移交仍持有的任务本体，已易手的按过期上报。
    // 每个请求方总能收到一个批次（可能为空），否则对方会一直等。
    fn donate_jobs(&mut self, transfers: &[JobTransfer]) -> Vec<Outbound> {
        let mut per_recipient: BTreeMap<NodeInfo, (Vec<Job>, Vec<TransferError>)> = BTreeMap::new();
        for transfer in transfers {
            let wanted = transfer.job.job_id;
            let (jobs, failures) = per_recipient.entry(transfer.recipient.clone()).or_default();
            match self.queue.iter().position(|j| j.id == wanted) {
                Some(at) => {
                    if let Some(job) = self.queue.remove(at) {
                        jobs.push(job);
                    }
                }
                None => {
                    // 任务已完成或已被迁走，丢弃该迁移，下一轮自愈
                    self.stale_transfers += 1;
                    warn!("{}: stale transfer for job {wanted}", self.info);
                    failures.push(TransferError::StaleJob(wanted));
                }
            }
        }

        let mut outbound = Vec::new();
        for (recipient, (jobs, failures)) in per_recipient {
            if !failures.is_empty() {
                let text = failures
                    .iter()
                    .map(TransferError::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                outbound.push(Outbound::new(recipient.clone(), Message::Response { text }));
            }
            outbound.push(Outbound::new(recipient, Message::JobBatch { jobs }));
        }
        outbound
    }
}
