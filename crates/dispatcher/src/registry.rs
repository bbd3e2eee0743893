use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use connector_core::{ConnectorError, ConnectorResult, Envelope};

/// 响应登记表：关联ID到单槽位投递通道的映射
///
/// 出站路径创建槽位并持有接收端，入站路径通过投递句柄写入结果。
/// 三个操作由同一把锁串行化；通道容量为1，投递方不会因消费者
/// 缺席而阻塞，一个槽位至多接收一次投递。
#[derive(Debug, Default)]
pub struct ResponseRegistry {
    slots: Mutex<HashMap<String, mpsc::Sender<Envelope>>>,
}

impl ResponseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为关联ID创建新的等待槽位，ID已被占用时报重复错误
    pub fn create(&self, id: &str) -> ConnectorResult<mpsc::Receiver<Envelope>> {
        let mut slots = self.slots.lock();
        if slots.contains_key(id) {
            return Err(ConnectorError::DuplicateCorrelation { id: id.to_string() });
        }
        let (tx, rx) = mpsc::channel(1);
        slots.insert(id.to_string(), tx);
        Ok(rx)
    }

    /// 查找投递句柄，不存在返回None，永不阻塞
    pub fn resolver(&self, id: &str) -> Option<mpsc::Sender<Envelope>> {
        self.slots.lock().get(id).cloned()
    }

    /// 幂等移除
    pub fn remove(&self, id: &str) {
        self.slots.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
