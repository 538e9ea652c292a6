//! 扇入收集器模块 - 基于crossbeam-channel实现
//!
//! 聚合阶段的阻塞点：内部节点在所有子节点汇报齐之前不得向上
//! 汇报，子节点失联时按期限放弃等待，带着缺口继续。

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};

/// 收集通道容量
const CHANNEL_CAPACITY: usize = 256;

/// 按键去重的扇入收集器
///
/// 等待`expected`个不同键的报告到齐，或期限到达为止。
/// 同一键的重复报告以后到者为准。
pub struct Collector<K, V> {
    expected: usize,
    tx: Sender<(K, V)>,
    rx: Receiver<(K, V)>,
    reports: HashMap<K, V>,
}

/// 可跨线程克隆的投递句柄
#[derive(Clone)]
pub struct CollectorHandle<K, V> {
    tx: Sender<(K, V)>,
}

impl<K: Eq + Hash, V> CollectorHandle<K, V> {
    /// 投递一份报告，收集器已关闭时返回false
    pub fn add(&self, key: K, value: V) -> bool {
        self.tx.send((key, value)).is_ok()
    }
}

impl<K: Eq + Hash + Clone, V> Collector<K, V> {
    /// 创建等待指定报告数的收集器
    pub fn new(expected: usize) -> Self {
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        Self {
            expected,
            tx,
            rx,
            reports: HashMap::new(),
        }
    }

    /// 取得可分发给汇报方的投递句柄
    pub fn handle(&self) -> CollectorHandle<K, V> {
        CollectorHandle {
            tx: self.tx.clone(),
        }
    }

    /// 本地直接记入一份报告
    pub fn add(&mut self, key: K, value: V) {
        self.reports.insert(key, value);
    }

    /// 非阻塞吸收通道里已到的报告
    pub fn drain(&mut self) {
        while let Ok((key, value)) = self.rx.try_recv() {
            self.reports.insert(key, value);
        }
    }

    /// 报告是否已到齐
    pub fn is_complete(&self) -> bool {
        self.reports.len() >= self.expected
    }

    /// 阻塞等待报告到齐或期限到达
    ///
    /// 返回是否到齐；未到齐即降级，缺失方由调用方核对并记录。
    pub fn wait_deadline(&mut self, deadline: Instant) -> bool {
        self.drain();
        while !self.is_complete() {
            match self.rx.recv_deadline(deadline) {
                Ok((key, value)) => {
                    self.reports.insert(key, value);
                }
                Err(_) => break, // 超时
            }
        }
        let complete = self.is_complete();
        if !complete {
            log::warn!(
                "collector timed out with {}/{} reports",
                self.reports.len(),
                self.expected
            );
        }
        complete
    }

    /// 已汇报的键
    pub fn reported_keys(&self) -> impl Iterator<Item = &K> {
        self.reports.keys()
    }

    /// 查看当前已收到的报告
    pub fn reports(&self) -> &HashMap<K, V> {
        &self.reports
    }

    /// 取出全部报告，结束收集
    pub fn into_reports(mut self) -> HashMap<K, V> {
        self.drain();
        self.reports
    }
}
