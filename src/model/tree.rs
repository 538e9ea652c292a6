//! 层级树线路表示

use serde::{Deserialize, Serialize};

use crate::model::node::NodeInfo;

/// 树节点的线路表示
///
/// 整棵树每个构建周期重建一次，不与上一代做差分。
/// 不变量：一棵树中恰有一个节点`parent`为空（根）；
/// 子节点列表为空的节点是叶子。
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TreeNode {
    /// 本节点身份
    pub node: NodeInfo,
    /// 父节点身份，根节点为空
    pub parent: Option<NodeInfo>,
    /// 直接子节点，保持构建顺序
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// 创建无父无子的孤立节点
    pub fn new(node: NodeInfo) -> Self {
        Self {
            node,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// 直接子节点的身份列表
    pub fn child_nodes(&self) -> Vec<NodeInfo> {
        self.children.iter().map(|c| c.node.clone()).collect()
    }

    /// 以本节点为根的子树内全部节点数
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }
}
