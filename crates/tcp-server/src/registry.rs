//! 客户端注册表与事件扇出。
//!
//! 并发模型：
//! - 客户端记录保存在 `RwLock<HashMap>` 里，枚举先取一致快照，
//!   投递不在持锁状态下进行；
//! - 每个客户端持有一个有界的出站队列（mpsc），由该连接自己的写任务
//!   独占排空，单个 writer 的写入因此天然串行；
//! - 队列已关闭或溢出视为永久断开：对应客户端被移出注册表，
//!   单个接收者的失败不会影响其他接收者。

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::protocol::Envelope;

/// 单个出站队列的容量；慢到把队列填满的消费者会被驱逐。
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

struct ClientHandle {
    sender: mpsc::Sender<String>,
    /// 认证成功后绑定；注册表是该字段唯一的修改者。
    username: Option<String>,
}

impl ClientHandle {
    fn bound_username(&self) -> Option<&str> {
        self.username.as_deref().filter(|name| !name.trim().is_empty())
    }
}

#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<u64, ClientHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, client_id: u64, sender: mpsc::Sender<String>) {
        let mut clients = self.clients.write().await;
        clients.insert(
            client_id,
            ClientHandle {
                sender,
                username: None,
            },
        );
        info!(client_id, total = clients.len(), "客户端加入注册表");
    }

    /// 幂等移除；之后对该 id 的发送都是 no-op。
    pub async fn remove(&self, client_id: u64) -> bool {
        let removed = self.clients.write().await.remove(&client_id).is_some();
        if removed {
            info!(client_id, "客户端移出注册表");
        }
        removed
    }

    pub async fn bind_username(&self, client_id: u64, username: &str) {
        if let Some(handle) = self.clients.write().await.get_mut(&client_id) {
            handle.username = Some(username.to_owned());
            debug!(client_id, username, "用户名已绑定");
        }
    }

    /// 在线人数 = 已绑定用户名的连接数。
    pub async fn online_count(&self) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|handle| handle.bound_username().is_some())
            .count()
    }

    /// 在线用户快照：大小写不敏感去重，按名字排序。
    pub async fn online_snapshot(&self) -> Vec<String> {
        let mut unique: HashMap<String, String> = HashMap::new();
        for handle in self.clients.read().await.values() {
            if let Some(name) = handle.bound_username() {
                unique.insert(name.to_lowercase(), name.to_owned());
            }
        }

        let mut names: Vec<String> = unique.into_values().collect();
        names.sort_by_key(|name| name.to_lowercase());
        names
    }

    /// 发给所有当前客户端；事件只序列化一次。
    pub async fn broadcast(&self, event: &Envelope) {
        self.fan_out(None, event).await;
    }

    /// 同 broadcast，但跳过指定客户端。
    pub async fn broadcast_except(&self, exclude_id: u64, event: &Envelope) {
        self.fan_out(Some(exclude_id), event).await;
    }

    async fn fan_out(&self, exclude: Option<u64>, event: &Envelope) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "事件序列化失败");
                return;
            }
        };

        let targets: Vec<(u64, mpsc::Sender<String>)> = self
            .clients
            .read()
            .await
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(id, handle)| (*id, handle.sender.clone()))
            .collect();

        let mut dead = Vec::new();
        for (client_id, sender) in targets {
            if sender.try_send(json.clone()).is_err() {
                dead.push(client_id);
            }
        }

        for client_id in dead {
            warn!(client_id, "广播投递失败，移除客户端");
            self.remove(client_id).await;
        }
    }

    /// 发送给指定客户端；不存在或投递失败返回 false（失败即驱逐）。
    pub async fn send_to_client(&self, client_id: u64, event: &Envelope) -> bool {
        let sender = match self.clients.read().await.get(&client_id) {
            Some(handle) => handle.sender.clone(),
            None => return false,
        };

        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "事件序列化失败");
                return false;
            }
        };

        if sender.try_send(json).is_err() {
            warn!(client_id, "定向投递失败，移除客户端");
            self.remove(client_id).await;
            return false;
        }
        true
    }

    /// 按用户名投递（大小写不敏感，命中第一个绑定该名字的连接）。
    pub async fn send_to_user(&self, username: &str, event: &Envelope) -> bool {
        let key = username.trim().to_lowercase();
        if key.is_empty() {
            return false;
        }

        let target = self
            .clients
            .read()
            .await
            .iter()
            .find(|(_, handle)| {
                handle
                    .bound_username()
                    .is_some_and(|name| name.to_lowercase() == key)
            })
            .map(|(id, _)| *id);

        match target {
            Some(client_id) => self.send_to_client(client_id, event).await,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol;

    fn event() -> Envelope {
        Envelope::error(protocol::VALIDATION_ERROR, "test")
    }

    async fn register(registry: &ClientRegistry, client_id: u64) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        registry.add(client_id, tx).await;
        rx
    }

    #[tokio::test]
    async fn broadcast_reaches_every_client_exactly_once() {
        let registry = ClientRegistry::new();
        let mut rx1 = register(&registry, 1).await;
        let mut rx2 = register(&registry, 2).await;

        registry.broadcast(&event()).await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_except_skips_the_excluded_client() {
        let registry = ClientRegistry::new();
        let mut rx1 = register(&registry, 1).await;
        let mut rx2 = register(&registry, 2).await;

        registry.broadcast_except(1, &event()).await;

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dead_client_is_evicted_on_broadcast() {
        let registry = ClientRegistry::new();
        let rx1 = register(&registry, 1).await;
        let mut rx2 = register(&registry, 2).await;
        drop(rx1); // 模拟写端已死

        registry.broadcast(&event()).await;

        assert!(rx2.try_recv().is_ok());
        assert!(!registry.send_to_client(1, &event()).await);
        assert!(registry.send_to_client(2, &event()).await);
    }

    #[tokio::test]
    async fn send_to_removed_client_is_a_noop() {
        let registry = ClientRegistry::new();
        let _rx = register(&registry, 1).await;

        assert!(registry.remove(1).await);
        assert!(!registry.remove(1).await);
        assert!(!registry.send_to_client(1, &event()).await);
    }

    #[tokio::test]
    async fn send_to_user_matches_case_insensitively() {
        let registry = ClientRegistry::new();
        let mut rx = register(&registry, 1).await;
        registry.bind_username(1, "Alice").await;

        assert!(registry.send_to_user("aLiCe", &event()).await);
        assert!(rx.try_recv().is_ok());

        assert!(!registry.send_to_user("bob", &event()).await);
        assert!(!registry.send_to_user("   ", &event()).await);
    }

    #[tokio::test]
    async fn online_count_only_counts_bound_clients() {
        let registry = ClientRegistry::new();
        let _rx1 = register(&registry, 1).await;
        let _rx2 = register(&registry, 2).await;

        assert_eq!(registry.online_count().await, 0);

        registry.bind_username(1, "alice").await;
        assert_eq!(registry.online_count().await, 1);

        registry.bind_username(2, "bob").await;
        assert_eq!(registry.online_count().await, 2);

        registry.remove(2).await;
        assert_eq!(registry.online_count().await, 1);
    }

    #[tokio::test]
    async fn snapshot_is_deduplicated_and_sorted() {
        let registry = ClientRegistry::new();
        let _rx1 = register(&registry, 1).await;
        let _rx2 = register(&registry, 2).await;
        let _rx3 = register(&registry, 3).await;

        registry.bind_username(1, "Carol").await;
        registry.bind_username(2, "alice").await;
        registry.bind_username(3, "ALICE").await;

        let snapshot = registry.online_snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].to_lowercase(), "alice");
        assert_eq!(snapshot[1], "Carol");
    }
}
