//! 节点/任务标识分配模块
//!
//! 全局唯一、单调递增的ID分配器。ID一旦发出绝不复用，
//! 即使对应节点已经死亡。

use parking_lot::Mutex;

/// ID分配器
///
/// 既可本地自增分配，也可通过[`import`](IdAllocator::import)吸收
/// 远端权威指定的ID并抬高内部计数器，保证后续分配不会碰撞。
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: Mutex<i32>,
}

impl IdAllocator {
    /// 创建计数器从0开始的分配器
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配一个新ID，严格大于之前所有已分配或已导入的ID
    pub fn assign(&self) -> i32 {
        let mut next = self.next.lock();
        let id = *next;
        *next += 1;
        id
    }

    /// 记录外部指定的ID并抬高计数器
    pub fn import(&self, id: i32) {
        let mut next = self.next.lock();
        if id >= *next {
            *next = id + 1;
        }
    }
}
