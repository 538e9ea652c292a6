//! 层级树构建模块
//!
//! 把有序节点列表按完全b叉树映射成一棵根树：下标0为根，
//! 下标i(i>0)的父节点是下标(i-1)/b。映射是确定性的，任何
//! 组件用同一输入都会得到同一棵树，因此树只需由发起方算一次
//! 再推送出去，无需协商。
//!
//! 内部用下标互链的arena存储，避免父子对象间的所有权环；
//! 线路表示通过[`TreeArena::subtree`]按需导出。

use crate::model::node::NodeInfo;
use crate::model::tree::TreeNode;
use crate::TopologyError;

#[derive(Debug, Clone)]
struct Entry {
    node: NodeInfo,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// 一代层级树的arena快照，构建后只读
#[derive(Debug, Clone)]
pub struct TreeArena {
    entries: Vec<Entry>,
}

impl TreeArena {
    /// 按完全b叉树映射构建层级树
    ///
    /// 空节点列表和小于1的分支因子都是构建错误，不产生半成品树。
    pub fn build(
        branching_factor: u32,
        nodes: Vec<NodeInfo>,
    ) -> std::result::Result<Self, TopologyError> {
        if branching_factor < 1 {
            return Err(TopologyError::BadBranching(branching_factor));
        }
        if nodes.is_empty() {
            return Err(TopologyError::EmptyNodes);
        }

        let b = branching_factor as usize;
        let mut entries: Vec<Entry> = nodes
            .into_iter()
            .map(|node| Entry {
                node,
                parent: None,
                children: Vec::new(),
            })
            .collect();

        for i in 1..entries.len() {
            let parent = (i - 1) / b;
            entries[i].parent = Some(parent);
            entries[parent].children.push(i);
        }

        Ok(Self { entries })
    }

    /// 树内节点总数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 根节点下标恒为0
    pub fn root_index(&self) -> usize {
        0
    }

    /// 按下标取节点身份
    pub fn node(&self, index: usize) -> &NodeInfo {
        &self.entries[index].node
    }

    /// 查找节点身份对应的下标
    pub fn index_of(&self, node: &NodeInfo) -> Option<usize> {
        self.entries.iter().position(|e| &e.node == node)
    }

    /// 父节点下标，根返回None
    pub fn parent_index(&self, index: usize) -> Option<usize> {
        self.entries[index].parent
    }

    /// 直接子节点下标列表
    pub fn child_indices(&self, index: usize) -> &[usize] {
        &self.entries[index].children
    }

    /// 导出指定节点的线路子树视图
    ///
    /// 视图携带该节点的父身份和完整子树，至少覆盖传播契约
    /// 要求的"自己的父节点+直接子节点列表"。
    pub fn subtree(&self, index: usize) -> TreeNode {
        TreeNode {
            node: self.entries[index].node.clone(),
            parent: self.entries[index]
                .parent
                .map(|p| self.entries[p].node.clone()),
            children: self.entries[index]
                .children
                .iter()
                .map(|&c| self.subtree(c))
                .collect(),
        }
    }

    /// 整棵树的线路视图
    pub fn root(&self) -> TreeNode {
        self.subtree(0)
    }
}
