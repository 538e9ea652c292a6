//! HiveTree 核心库入口 - 层级树拓扑协议与权重负载均衡引擎

pub mod balancer;
pub mod collector;
pub mod config;
pub mod identity;
pub mod message;
pub mod model;
pub mod node;
pub mod tree;

/// 拓扑构建错误类型
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TopologyError {
    #[error("节点列表为空，无法构建层级树")]
    EmptyNodes,
    #[error("无效的分支因子: {0} (必须 >= 1)")]
    BadBranching(u32),
}

/// 协议层错误类型
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("消息格式错误: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("节点尚未获得层级信息")]
    NoHierarchy,
    #[error("收到非预期发送方 {0} 的聚合报告")]
    UnexpectedReport(String),
    #[error("拓扑构建失败: {0}")]
    Topology(#[from] TopologyError),
}

/// 任务迁移错误类型
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TransferError {
    #[error("任务 {0} 已不在捐出方队列中")]
    StaleJob(i32),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

// 公开导出模块的公共接口
pub use balancer::{balance, NodeLoad};
pub use collector::Collector;
pub use config::EngineConfig;
pub use identity::IdAllocator;
pub use message::Message;
pub use model::job::{Job, JobInfo, JobKind};
pub use model::node::{LoadInfo, NodeInfo};
pub use model::transfer::{JobTransfer, LoadBalancingResult};
pub use model::tree::TreeNode;
pub use node::{NodeEngine, Outbound};
pub use tree::TreeArena;
