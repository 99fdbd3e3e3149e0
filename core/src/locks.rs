use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

/// 每个项目源码目录一把读写锁：扫描持读锁，clone/pull 持写锁
#[derive(Clone, Default)]
pub struct ProjectLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<RwLock<()>>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, project: Uuid) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().await;
        // 只剩表内引用的锁没有持有者，可以回收
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(project).or_default().clone()
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// 读取源码树（扫描）
    pub async fn read(&self, project: Uuid) -> OwnedRwLockReadGuard<()> {
        self.lock_for(project).await.read_owned().await
    }

    /// 修改源码树（clone / pull）
    pub async fn write(&self, project: Uuid) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(project).await.write_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn writer_waits_for_reader() {
        let locks = ProjectLocks::new();
        let project = Uuid::new_v4();

        let reader = locks.read(project).await;
        let pending = tokio::time::timeout(Duration::from_millis(50), locks.write(project)).await;
        assert!(pending.is_err(), "write lock must wait for the scan to finish");

        drop(reader);
        let writer = tokio::time::timeout(Duration::from_millis(50), locks.write(project)).await;
        assert!(writer.is_ok());
    }

    #[tokio::test]
    async fn idle_locks_are_evicted() {
        let locks = ProjectLocks::new();
        for _ in 0..10 {
            drop(locks.write(Uuid::new_v4()).await);
        }

        let held = Uuid::new_v4();
        let guard = locks.read(held).await;
        assert_eq!(locks.tracked().await, 1);

        // 持有中的锁不能被回收，否则写者会拿到另一把锁
        let _other = locks.read(Uuid::new_v4()).await;
        assert_eq!(locks.tracked().await, 2);
        let pending = tokio::time::timeout(Duration::from_millis(50), locks.write(held)).await;
        assert!(pending.is_err());

        drop(guard);
        assert!(tokio::time::timeout(Duration::from_millis(50), locks.write(held))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn readers_share_and_projects_are_independent() {
        let locks = ProjectLocks::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let _r1 = locks.read(a).await;
        let _r2 = locks.read(a).await;
        let w = tokio::time::timeout(Duration::from_millis(50), locks.write(b)).await;
        assert!(w.is_ok());
    }
}
