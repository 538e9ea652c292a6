//! 引擎配置模块

use std::time::Duration;

/// 均衡引擎配置
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 负载偏离组平均值多少以内视为均衡
    pub imbalance_tolerance: f64,
    /// 聚合阶段等待子节点汇报的期限
    pub collect_timeout: Duration,
    /// 两轮均衡操作之间的最小间隔
    pub min_balance_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            imbalance_tolerance: 0.1,
            collect_timeout: Duration::from_secs(2),
            min_balance_interval: Duration::from_secs(5),
        }
    }
}
