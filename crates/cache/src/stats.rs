//! 缓存统计

use std::sync::atomic::{AtomicU64, Ordering};

use crate::outcome::CacheFailure;

/// 进程内缓存计数器
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    skipped_nulls: AtomicU64,
    backend_errors: AtomicU64,
    timeouts: AtomicU64,
    serialization_errors: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped_null(&self) {
        self.skipped_nulls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, failure: CacheFailure) {
        let counter = match failure {
            CacheFailure::Backend => &self.backend_errors,
            CacheFailure::Timeout => &self.timeouts,
            CacheFailure::Serialization => &self.serialization_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取快照
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            skipped_nulls: self.skipped_nulls.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            serialization_errors: self.serialization_errors.load(Ordering::Relaxed),
        }
    }
}

/// 缓存统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    /// 命中次数
    pub hits: u64,
    /// 未命中次数
    pub misses: u64,
    /// 写入次数
    pub writes: u64,
    /// 删除的键数量
    pub deletes: u64,
    /// 因区域不缓存空值而跳过的写入
    pub skipped_nulls: u64,
    /// 后端错误
    pub backend_errors: u64,
    /// 超时
    pub timeouts: u64,
    /// 序列化错误
    pub serialization_errors: u64,
}

impl CacheStatsSnapshot {
    /// 命中率，没有查询时为 0
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }

    /// 被吸收的故障总数
    pub fn failures(&self) -> u64 {
        self.backend_errors + self.timeouts + self.serialization_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_ratio() {
        let stats = CacheStats::new();
        assert_eq!(stats.snapshot().hit_ratio(), 0.0);

        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_delete(2);
        stats.record_failure(CacheFailure::Timeout);
        stats.record_failure(CacheFailure::Serialization);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.deletes, 2);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.failures(), 2);
        assert!((snapshot.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }
}
