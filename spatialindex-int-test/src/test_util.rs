use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spatialindex::{
    DiskStore, DiskStoreConfig, Entry, EntryId, IndexConfig, MemoryStore, RTree, Region,
    SpatialResult,
};
use std::backtrace::Backtrace;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread to avoid thread exhaustion when running many tests in parallel.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> SpatialResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> SpatialResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> SpatialResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => match after(ctx) {
                        Ok(_) => Ok(()),
                        Err(e) => Err((format!("After run failed: {:?}", e), backtrace.to_string())),
                    },
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_error = Some(e.clone());
                last_backtrace = Some(bt);
                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Error: {}", e);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                let message = format!("Panic: {}", err_msg);

                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Panicked (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("{}", message);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
                last_error = Some(message);
                last_backtrace = Some(Backtrace::capture().to_string());
            }
        }
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// Per-test scratch directory shared by clones of the context.
#[derive(Clone)]
pub struct TestContext {
    dir: Arc<TempDir>,
}

impl TestContext {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the scratch directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// A fresh disk store in the scratch directory.
    pub fn disk_store(&self, name: &str) -> SpatialResult<DiskStore<Region>> {
        DiskStore::create(self.file(name), small_pages())
    }

    pub fn reopen_disk_store(&self, name: &str) -> SpatialResult<DiskStore<Region>> {
        DiskStore::open(self.file(name), small_pages())
    }
}

pub fn create_test_context() -> SpatialResult<TestContext> {
    let dir = tempfile::Builder::new().prefix("spatialindex-").tempdir()?;
    Ok(TestContext { dir: Arc::new(dir) })
}

pub fn cleanup(ctx: TestContext) -> SpatialResult<()> {
    let path = ctx.path().to_path_buf();
    // the directory goes away with the last clone
    drop(ctx);
    if path.exists() {
        if let Err(e) = std::fs::remove_dir_all(&path) {
            eprintln!(
                "Warning: Failed to remove test directory {:?}: {:?}",
                path, e
            );
        }
    }
    Ok(())
}

/// Disk store settings small enough to exercise eviction in tests.
pub fn small_pages() -> DiskStoreConfig {
    DiskStoreConfig::default()
        .with_page_size(4096)
        .with_cache_pages(8)
}

/// Capacity 8 with 40% minimum fill: deep trees from modest inputs.
pub fn test_config() -> IndexConfig {
    IndexConfig::new(2).with_capacity(8).with_fill_factor(0.4)
}

pub fn memory_tree(config: IndexConfig) -> SpatialResult<RTree<Region, MemoryStore<Region>>> {
    RTree::create(MemoryStore::new(), config)
}

pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Region {
    Region::new(vec![x0, y0], vec![x1, y1]).expect("valid rectangle")
}

/// `count` small random rectangles in `[0, 1000)^2`, reproducible from `seed`.
pub fn random_entries(count: usize, seed: u64) -> Vec<Entry<Region>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let x = rng.random_range(0.0..1000.0);
            let y = rng.random_range(0.0..1000.0);
            let w = rng.random_range(0.0..10.0);
            let h = rng.random_range(0.0..10.0);
            Entry::new(i as EntryId, rect(x, y, x + w, y + h))
        })
        .collect()
}

/// Identifiers of `entries` intersecting `query`, by linear scan.
pub fn brute_force(entries: &[Entry<Region>], query: &Region) -> Vec<EntryId> {
    let mut ids: Vec<EntryId> = entries
        .iter()
        .filter(|e| e.region.intersects(query).unwrap_or(false))
        .map(|e| e.id)
        .collect();
    ids.sort();
    ids
}

pub fn sorted(mut ids: Vec<EntryId>) -> Vec<EntryId> {
    ids.sort();
    ids
}
