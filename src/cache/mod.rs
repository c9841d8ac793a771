//! Build-once holder for the dataset view.
//!
//! The first caller runs the loader; callers arriving while that build is in
//! flight block on a condition variable and receive the same outcome. Only a
//! successful build is retained.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::{error::PipelineError, pipeline::Pipeline, view::ColumnarView};

type Outcome = Result<Arc<ColumnarView>, PipelineError>;

/// Produces a fresh view; run by the cache at most once per build.
pub trait Loader: Send + Sync {
    fn load(&self) -> Result<ColumnarView, PipelineError>;
}

impl<F> Loader for F
where
    F: Fn() -> Result<ColumnarView, PipelineError> + Send + Sync,
{
    fn load(&self) -> Result<ColumnarView, PipelineError> {
        self()
    }
}

impl Loader for Pipeline {
    fn load(&self) -> Result<ColumnarView, PipelineError> {
        self.run()
    }
}

enum Slot {
    Idle,
    Building(u64),
    Ready(Arc<ColumnarView>),
}

struct Delivery {
    outcome: Outcome,
    pending: usize,
}

struct State {
    slot: Slot,
    epoch: u64,
    next_build: u64,
    waiting: HashMap<u64, usize>,
    delivered: HashMap<u64, Delivery>,
}

pub struct RefreshCache<L> {
    loader: L,
    state: Mutex<State>,
    finished: Condvar,
    builds: AtomicUsize,
}

impl<L: Loader> RefreshCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            state: Mutex::new(State {
                slot: Slot::Idle,
                epoch: 0,
                next_build: 0,
                waiting: HashMap::new(),
                delivered: HashMap::new(),
            }),
            finished: Condvar::new(),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Returns the cached view, building it first if needed.
    pub fn get_or_build(&self) -> Outcome {
        let mut state = self.lock();
        match state.slot {
            Slot::Ready(ref view) => {
                debug!("dataset cache hit");
                return Ok(Arc::clone(view));
            }
            Slot::Building(build) => {
                debug!(build, "waiting for in-flight dataset build");
                *state.waiting.entry(build).or_default() += 1;
                self.finished
                    .wait_while(&mut state, |state| !state.delivered.contains_key(&build));
                return take_delivery(&mut state, build);
            }
            Slot::Idle => {}
        }

        let build = state.next_build;
        let epoch = state.epoch;
        state.next_build += 1;
        state.slot = Slot::Building(build);
        drop(state);

        self.builds.fetch_add(1, Ordering::SeqCst);
        info!(build, "building dataset");

        let mut guard = BuildGuard {
            cache: self,
            build,
            epoch,
            armed: true,
        };
        let outcome = self.loader.load().map(Arc::new);
        guard.armed = false;

        if let Err(error) = &outcome {
            warn!(build, %error, "dataset build failed");
        }
        self.finish(build, epoch, outcome.clone());
        outcome
    }

    /// Drops the cached view so the next `get_or_build` refetches.
    ///
    /// A build already in flight still answers its waiters but is not kept.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.slot = Slot::Idle;
        info!("dataset cache invalidated");
    }

    /// The cached view, without triggering a build.
    pub fn peek(&self) -> Option<Arc<ColumnarView>> {
        match &self.lock().slot {
            Slot::Ready(view) => Some(Arc::clone(view)),
            _ => None,
        }
    }

    /// Number of loader runs started so far.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn finish(
        &self,
        build: u64,
        epoch: u64,
        outcome: Outcome,
    ) {
        let mut state = self.lock();

        if matches!(state.slot, Slot::Building(current) if current == build) {
            state.slot = match &outcome {
                Ok(view) if state.epoch == epoch => Slot::Ready(Arc::clone(view)),
                _ => Slot::Idle,
            };
        }

        if let Some(pending) = state.waiting.remove(&build) {
            state
                .delivered
                .insert(build, Delivery { outcome, pending });
        }

        drop(state);
        self.finished.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }

    #[cfg(test)]
    fn waiters(&self) -> usize {
        self.lock().waiting.values().sum()
    }
}

fn take_delivery(
    state: &mut State,
    build: u64,
) -> Outcome {
    let Some(delivery) = state.delivered.get_mut(&build) else {
        return Err(PipelineError::BuildPanicked);
    };
    delivery.pending -= 1;
    if delivery.pending == 0 {
        state
            .delivered
            .remove(&build)
            .map_or(Err(PipelineError::BuildPanicked), |delivery| delivery.outcome)
    } else {
        delivery.outcome.clone()
    }
}

/// Resets the cache if the loader unwinds.
struct BuildGuard<'a, L: Loader> {
    cache: &'a RefreshCache<L>,
    build: u64,
    epoch: u64,
    armed: bool,
}

impl<L: Loader> Drop for BuildGuard<'_, L> {
    fn drop(&mut self) {
        if self.armed {
            warn!(build = self.build, "dataset build panicked");
            self.cache
                .finish(self.build, self.epoch, Err(PipelineError::BuildPanicked));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        panic::{AssertUnwindSafe, catch_unwind},
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
            mpsc,
        },
        thread,
        time::Duration,
    };

    use parking_lot::Mutex;

    use crate::{
        error::{PipelineError, StoreError},
        record::FlightRecord,
        table::WorkingTable,
        view::{ColumnarView, build_view},
    };

    use super::RefreshCache;

    type Built = Result<ColumnarView, PipelineError>;

    fn fares(rows: usize) -> ColumnarView {
        build_view(WorkingTable::from_records(
            (0..rows)
                .map(|index| FlightRecord {
                    airline: format!("airline-{index}"),
                    source: "Delhi".to_string(),
                    destination: "Cochin".to_string(),
                    total_stops: "non-stop".to_string(),
                    duration: "3h".to_string(),
                    price: 1000.0 + index as f64,
                })
                .collect(),
        ))
    }

    fn unreachable() -> PipelineError {
        PipelineError::Connectivity(StoreError::FetchFailed {
            collection: "Fight_data".to_string(),
            reason: "connection refused".to_string(),
        })
    }

    fn wait_until(condition: impl Fn() -> bool) {
        while !condition() {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn concurrent_callers_share_one_build() {
        const CALLERS: usize = 8;
        let (release, gate) = mpsc::channel::<()>();
        let gate = Mutex::new(gate);
        let cache = RefreshCache::new(move || -> Built {
            gate.lock()
                .recv()
                .expect("gate must open");
            Ok(fares(3))
        });

        let views: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|_| scope.spawn(|| cache.get_or_build()))
                .collect();

            wait_until(|| cache.builds() == 1 && cache.waiters() == CALLERS - 1);
            release.send(()).expect("gate must be open");

            handles
                .into_iter()
                .map(|handle| handle.join().expect("caller must not panic"))
                .collect()
        });

        assert_eq!(cache.builds(), 1);
        let first = views[0].as_ref().expect("build must succeed");
        for view in &views {
            let view = view.as_ref().expect("build must succeed");
            assert_eq!(view.row_count(), 3);
            assert!(Arc::ptr_eq(first, view));
        }
        assert_eq!(cache.waiters(), 0);
    }

    #[test]
    fn failure_reaches_every_waiter_and_next_call_retries() {
        const CALLERS: usize = 4;
        let attempts = AtomicUsize::new(0);
        let (release, gate) = mpsc::channel::<()>();
        let gate = Mutex::new(gate);
        let cache = RefreshCache::new(move || -> Built {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                gate.lock()
                    .recv()
                    .expect("gate must open");
                return Err(unreachable());
            }
            Ok(fares(2))
        });

        let outcomes: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|_| scope.spawn(|| cache.get_or_build()))
                .collect();

            wait_until(|| cache.builds() == 1 && cache.waiters() == CALLERS - 1);
            release.send(()).expect("gate must be open");

            handles
                .into_iter()
                .map(|handle| handle.join().expect("caller must not panic"))
                .collect()
        });

        assert!(outcomes.iter().all(|outcome| outcome == &Err(unreachable())));
        assert!(cache.peek().is_none());

        let retried = cache.get_or_build().expect("retry must succeed");
        assert_eq!(retried.row_count(), 2);
        assert_eq!(cache.builds(), 2);
    }

    #[test]
    fn cached_view_is_reused_until_invalidated() {
        let cache = RefreshCache::new(|| -> Built { Ok(fares(1)) });

        let first = cache.get_or_build().expect("build must succeed");
        let second = cache.get_or_build().expect("cache must hit");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.builds(), 1);

        cache.invalidate();
        assert!(cache.peek().is_none());
        let third = cache.get_or_build().expect("rebuild must succeed");
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(cache.builds(), 2);
    }

    #[test]
    fn empty_dataset_is_not_retained() {
        let cache = RefreshCache::new(|| -> Built {
            Err(PipelineError::EmptyDataset {
                collection: "Fight_data".to_string(),
            })
        });

        assert!(cache.get_or_build().is_err_and(|error| error.is_empty_dataset()));
        assert!(cache.get_or_build().is_err_and(|error| error.is_empty_dataset()));
        assert_eq!(cache.builds(), 2);
    }

    #[test]
    fn invalidation_during_build_discards_the_result() {
        let (release, gate) = mpsc::channel::<()>();
        let gate = Mutex::new(gate);
        let cache = RefreshCache::new(move || -> Built {
            gate.lock()
                .recv()
                .expect("gate must open");
            Ok(fares(1))
        });

        let outcome = thread::scope(|scope| {
            let handle = scope.spawn(|| cache.get_or_build());
            wait_until(|| cache.builds() == 1);
            cache.invalidate();
            release.send(()).expect("gate must be open");
            handle.join().expect("caller must not panic")
        });

        assert!(outcome.is_ok());
        assert!(cache.peek().is_none());
    }

    #[test]
    fn panicking_loader_resets_the_cache() {
        let attempts = AtomicUsize::new(0);
        let cache = RefreshCache::new(move || -> Built {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("loader exploded");
            }
            Ok(fares(1))
        });

        assert!(catch_unwind(AssertUnwindSafe(|| cache.get_or_build())).is_err());
        assert!(cache.get_or_build().is_ok());
        assert_eq!(cache.builds(), 2);
    }
}
