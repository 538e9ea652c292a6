//! 节点身份与负载值对象

use serde::{Deserialize, Serialize};

/// 节点身份信息
///
/// 创建后不可变；一旦拥有ID，`address`/`port`永不改变。
/// 排序按ID升序（未分配ID的节点排在最前）。
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeInfo {
    /// 全局唯一单调递增ID，分配前为空
    pub id: Option<i32>,
    /// 节点监听地址
    pub address: String,
    /// 节点监听端口
    pub port: u16,
}

impl NodeInfo {
    /// 创建尚未分配ID的节点信息
    pub fn unassigned(address: impl Into<String>, port: u16) -> Self {
        Self {
            id: None,
            address: address.into(),
            port,
        }
    }

    /// 用权威分配的ID复制一份节点信息
    pub fn with_id(id: i32, machine: &NodeInfo) -> Self {
        Self {
            id: Some(id),
            address: machine.address.clone(),
            port: machine.port,
        }
    }
}

impl std::fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(id) => write!(f, "node#{}@{}:{}", id, self.address, self.port),
            None => write!(f, "node#?@{}:{}", self.address, self.port),
        }
    }
}

/// 节点自报的瞬时负载
///
/// 负载为节点当前持有任务的权重之和（节点实现可叠加并发因子，
/// 但必须随任务权重单调）。
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LoadInfo {
    pub node: NodeInfo,
    pub load: f64,
}

impl LoadInfo {
    pub fn new(node: NodeInfo, load: f64) -> Self {
        Self { node, load }
    }
}
