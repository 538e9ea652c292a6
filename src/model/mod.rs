//! 协议数据模型 - 所有在线路上传输的值对象

pub mod job;
pub mod node;
pub mod transfer;
pub mod tree;

pub use job::{Job, JobInfo, JobKind};
pub use node::{LoadInfo, NodeInfo};
pub use transfer::{JobTransfer, LoadBalancingResult};
pub use tree::TreeNode;
