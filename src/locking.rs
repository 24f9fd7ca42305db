//! 按文件名加锁，用于串行化同名文件的并发上传。

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutexes keyed by sanitized upload file name.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 获取文件名锁；顺带清理无人持有的旧条目。
    pub async fn lock_file(&self, file_name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|key, lock| key == file_name || Arc::strong_count(lock) > 1);
            locks
                .entry(file_name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_name_waits_for_release() {
        let manager = Arc::new(LockManager::new());
        let guard = manager.lock_file("a.jpg").await;

        let contender = {
            let manager = manager.clone();
            tokio::spawn(async move {
                let _guard = manager.lock_file("a.jpg").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender acquired the lock")
            .expect("task");
    }

    #[tokio::test]
    async fn different_names_do_not_block_and_idle_entries_are_pruned() {
        let manager = LockManager::new();
        let first = manager.lock_file("a.jpg").await;
        let second = manager.lock_file("b.jpg").await;
        drop(first);
        drop(second);

        let _third = manager.lock_file("c.jpg").await;
        assert_eq!(manager.tracked().await, 1);
    }
}
