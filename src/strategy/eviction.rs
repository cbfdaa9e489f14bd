use color_eyre::Result;
use tracing::debug;

use crate::cache::{CacheStorage, Partition};

/// Delete oldest entries until the partition holds fewer than `max_entries`,
/// leaving room for one insert. Pure FIFO: lookups do not refresh an entry.
///
/// Returns how many entries were removed.
pub fn make_room<S: CacheStorage>(partition: &Partition<S>, max_entries: usize) -> Result<usize> {
  let keys = partition.keys()?;
  let max_entries = max_entries.max(1);
  if keys.len() < max_entries {
    return Ok(0);
  }

  let excess = keys.len() + 1 - max_entries;
  let mut removed = 0;
  for key in keys.iter().take(excess) {
    if partition.delete_key(key)? {
      removed += 1;
    }
  }

  debug!(partition = partition.name(), removed, "evicted oldest entries");
  Ok(removed)
}
