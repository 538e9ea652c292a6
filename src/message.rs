//! 消息信封模块
//!
//! 控制器、根节点与工作节点之间交换的所有消息共用一个闭合的
//! 标签联合类型。外部标签编码保证每条消息恰好携带一个变体：
//! 标签即判别字段，零个或多个标签在解码时直接判为格式错误。

use serde::{Deserialize, Serialize};

use crate::model::job::{Job, JobInfo};
use crate::model::node::{LoadInfo, NodeInfo};
use crate::model::transfer::{JobTransfer, LoadBalancingResult};
use crate::model::tree::TreeNode;
use crate::ProtocolError;

/// 线路消息信封
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Message {
    /// 请求控制器拉起指定数量的节点进程
    #[serde(rename_all = "camelCase")]
    SpinUpRequest { node_count: u32 },
    /// 请求控制器杀掉全部节点进程，立即且无条件
    KillRequest,
    /// 节点进程就绪通知，携带其监听端口
    NodeOnline { port: u16 },
    /// 控制器回报已拉起的节点列表
    NodesSpawned { nodes: Vec<NodeInfo> },
    /// 文本应答
    Response { text: String },
    /// 指示接收方按给定分支因子和节点列表构建层级树
    #[serde(rename_all = "camelCase")]
    BuildHierarchy {
        branching_factor: u32,
        nodes: Vec<NodeInfo>,
    },
    /// 节点向建树发起方通报自己的身份
    SendNodeInfo { node: NodeInfo },
    /// 派发一个任务
    DoWork { job: Job },
    /// 节点自报负载
    LoadInfo(LoadInfo),
    /// 下发层级树（接收方自己的子树视图）
    Hierarchy(TreeNode),
    /// 触发自上而下的任务清点
    CollectJobs { flag: bool },
    /// 自下而上的任务清单汇报
    JobInfoList { sender: NodeInfo, jobs: Vec<JobInfo> },
    /// 均衡结果，按执行顺序排列
    LoadBalancingResult(LoadBalancingResult),
    /// 接收方向捐出方索要任务本体
    JobTransferRequest { transfers: Vec<JobTransfer> },
    /// 任务本体批量移交
    JobBatch { jobs: Vec<Job> },
    /// 日志转发
    Log { text: String },
}

impl Message {
    /// 默认flag的清点指令
    pub fn collect_jobs() -> Self {
        Message::CollectJobs { flag: false }
    }

    /// 编码为参考JSON表示
    pub fn encode(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(ProtocolError::from)
    }

    /// 从参考JSON表示解码
    ///
    /// 变体缺失或多于一个都会落入[`ProtocolError::Malformed`]，
    /// 连接级错误，不致命。
    pub fn decode(raw: &str) -> crate::Result<Self> {
        serde_json::from_str(raw).map_err(ProtocolError::from)
    }
}
