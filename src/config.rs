/// Engine configuration.
///
/// All intervals are in milliseconds. The defaults are tuned for small to
/// medium graphs on commodity hardware; benchmarks should start from
/// [`Config::default`] and adjust the maintenance intervals.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of background worker threads. Defaults to the hardware
    /// parallelism reported by the OS.
    pub num_workers: usize,
    /// Capacity of a single segment, in bytes of payload.
    pub segment_capacity_bytes: usize,
    /// Number of segments per leaf.
    pub leaf_num_segments: usize,
    /// How often the cached snapshot of active transactions is refreshed.
    pub txnlist_refresh_interval_ms: u64,
    /// How often each worker runs a garbage-collection pass.
    pub gc_pass_interval_ms: u64,
    /// Delay before an asynchronous rebalance request is executed, allowing
    /// hot writers to finish and duplicate requests to coalesce.
    pub rebalance_delay_ms: u64,
    /// How often the merger scans for underfilled adjacent leaves.
    pub merger_interval_ms: u64,
    /// How often workers rebuild the free lists of the undo buffer pool.
    pub txnpool_pass_interval_ms: u64,
    /// Whether edge updates follow directed-graph semantics. In undirected
    /// mode every logical edge is materialised in both directions.
    pub directed: bool,
    /// A sparse-file insert that would shift more than this many elements
    /// converts the segment to the dense layout.
    pub dense_shift_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            segment_capacity_bytes: 8192,
            leaf_num_segments: 8,
            txnlist_refresh_interval_ms: 50,
            gc_pass_interval_ms: 100,
            rebalance_delay_ms: 5,
            merger_interval_ms: 1000,
            txnpool_pass_interval_ms: 500,
            directed: false,
            dense_shift_threshold: 64,
        }
    }
}

impl Config {
    /// Capacity of a segment measured in elements.
    ///
    /// An element accounts for its key, its weight and its version pointer.
    pub(crate) fn segment_capacity_elements(&self) -> usize {
        (self.segment_capacity_bytes / ELEMENT_FOOTPRINT_BYTES).max(4)
    }

    /// Fill level (in elements) past which a writer schedules an
    /// asynchronous spread for the segment it just updated.
    pub(crate) fn segment_high_watermark(&self) -> usize {
        self.segment_capacity_elements() * 9 / 10
    }
}

/// Accounted bytes per stored element: key (16), weight (8), version slot (8).
const ELEMENT_FOOTPRINT_BYTES: usize = 32;
