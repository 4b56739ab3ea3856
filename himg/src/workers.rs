use rayon::{prelude::*, ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

/// Fixed-size pool for block-row work. Without threads, work runs on the caller's thread.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    pool: Option<ThreadPool>,
}

impl WorkerPool {
    pub const fn sequential() -> Self {
        Self { pool: None }
    }

    pub fn new(threads: usize) -> Result<Self, ThreadPoolBuildError> {
        if threads == 0 {
            return Ok(Self::sequential());
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("himg-worker-{i}"))
            .build()?;
        Ok(Self { pool: Some(pool) })
    }

    pub fn threads(&self) -> usize {
        self.pool.as_ref().map_or(0, ThreadPool::current_num_threads)
    }

    /// Runs `f` on every item, stopping at the first error.
    pub fn try_for_each<T, E, F>(&self, items: Vec<T>, f: F) -> Result<(), E>
    where
        T: Send,
        E: Send,
        F: Fn(T) -> Result<(), E> + Sync + Send,
    {
        match &self.pool {
            None => items.into_iter().try_for_each(f),
            Some(pool) => pool.install(|| items.into_par_iter().try_for_each(f)),
        }
    }

    /// Maps every item, keeping the input order.
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        match &self.pool {
            None => items.into_iter().map(f).collect(),
            Some(pool) => pool.install(|| items.into_par_iter().map(f).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keeps_order() {
        for threads in [0, 1, 4] {
            let pool = WorkerPool::new(threads).unwrap();
            assert_eq!(pool.threads(), threads);
            let squares = pool.map((0..100u32).collect(), |v| v * v);
            assert_eq!(squares, (0..100u32).map(|v| v * v).collect::<Vec<_>>());
        }
    }

    #[test]
    fn try_for_each_reports_errors() {
        let pool = WorkerPool::new(3).unwrap();
        let mut out = vec![0u8; 10];
        pool.try_for_each(out.chunks_mut(3).collect(), |chunk| {
            chunk.fill(7);
            Ok::<_, ()>(())
        })
        .unwrap();
        assert_eq!(out, [7; 10]);

        let result = pool.try_for_each((0..10).collect(), |v| if v == 6 { Err(v) } else { Ok(()) });
        assert_eq!(result, Err(6));
    }
}
