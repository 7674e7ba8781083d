//! Block-at-or-before-timestamp resolution
//!
//! Block timestamps are non-decreasing in block number, so the block for a
//! cutoff can be found with a galloping search backwards from the chain head
//! followed by a binary search:
//!
//! ```text
//! latest ──(step, 2·step, 4·step, …)──► lo with ts(lo) ≤ cutoff
//!     ↓
//! binary search on (lo, hi] until left + 1 == right
//!     ↓
//! left = greatest block with ts ≤ cutoff
//! ```
//!
//! Every probe is one sequential network round trip. Timestamps are memoized
//! per resolver so repeated calls never re-fetch a block.

use crate::chain::{retry_remote, BlockSource, ChainError, RetryPolicy};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_INITIAL_STEP: u64 = 500;

pub struct BlockTimeResolver {
    source: Arc<dyn BlockSource>,
    initial_step: u64,
    retry: RetryPolicy,
    timestamps: HashMap<u64, i64>,
    probe_count: usize,
}

impl BlockTimeResolver {
    pub fn new(source: Arc<dyn BlockSource>) -> Self {
        Self::with_settings(source, DEFAULT_INITIAL_STEP, RetryPolicy::default())
    }

    pub fn with_settings(source: Arc<dyn BlockSource>, initial_step: u64, retry: RetryPolicy) -> Self {
        Self {
            source,
            initial_step: initial_step.max(1),
            retry,
            timestamps: HashMap::new(),
            probe_count: 0,
        }
    }

    /// Number of timestamp lookups that actually reached the block source
    pub fn probe_count(&self) -> usize {
        self.probe_count
    }

    /// Greatest block number in `[0, latest_block]` whose timestamp is `<= cutoff`,
    /// or 0 when even the genesis block is newer than the cutoff.
    pub async fn resolve_block_at_or_before(
        &mut self,
        cutoff: i64,
        latest_block: u64,
    ) -> Result<u64, ChainError> {
        let mut hi = latest_block;
        if self.timestamp_of(hi).await? <= cutoff {
            log::debug!("Head block {} is already at or before cutoff {}", hi, cutoff);
            return Ok(hi);
        }

        // Gallop backwards until a block at or before the cutoff (or genesis) is found
        let mut step = self.initial_step;
        let mut lo = hi.saturating_sub(step);
        loop {
            let lo_ts = self.timestamp_of(lo).await?;
            if lo_ts <= cutoff {
                break;
            }
            if lo == 0 {
                log::debug!("Genesis block is newer than cutoff {}", cutoff);
                return Ok(0);
            }
            hi = lo;
            step = step.saturating_mul(2);
            lo = hi.saturating_sub(step);
        }

        // Invariant: ts(left) <= cutoff < ts(right)
        let mut left = lo;
        let mut right = hi;
        while left + 1 < right {
            let mid = left + (right - left) / 2;
            if self.timestamp_of(mid).await? <= cutoff {
                left = mid;
            } else {
                right = mid;
            }
        }

        log::debug!(
            "Resolved cutoff {} to block {} ({} probes)",
            cutoff,
            left,
            self.probe_count
        );
        Ok(left)
    }

    async fn timestamp_of(&mut self, block_number: u64) -> Result<i64, ChainError> {
        if let Some(ts) = self.timestamps.get(&block_number) {
            return Ok(*ts);
        }

        let source = self.source.clone();
        let label = format!("eth_getBlockByNumber({})", block_number);
        let ts = retry_remote(self.retry, &label, || {
            let source = source.clone();
            async move { source.block_timestamp(block_number).await }
        })
        .await?;

        self.probe_count += 1;
        self.timestamps.insert(block_number, ts);
        Ok(ts)
    }
}
