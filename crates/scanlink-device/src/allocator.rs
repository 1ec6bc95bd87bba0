//! Gap-filling fingerprint slot allocation.

use scanlink_core::{Error, FingerprintId, Result};
use std::collections::BTreeSet;

/// Smallest free slot, filling holes before extending the range.
///
/// Walks the taken slots in ascending order with `last = 0`; the first slot
/// that is not `last + 1` reveals a gap at `last + 1`. Without a gap the
/// answer is one past the highest slot, and an empty set yields `1`.
///
/// Input order and duplicates do not matter. Pure function: it reads the
/// assignment set and mutates nothing.
///
/// ```
/// use scanlink_core::FingerprintId;
/// use scanlink_device::allocator::next_available_id;
///
/// let taken = [1, 2, 4].map(|n| FingerprintId::new(n).unwrap());
/// assert_eq!(next_available_id(taken).unwrap().get(), 3);
/// ```
///
/// # Errors
/// `Conflict` if every representable slot is taken.
pub fn next_available_id<I>(taken: I) -> Result<FingerprintId>
where
    I: IntoIterator<Item = FingerprintId>,
{
    let sorted: BTreeSet<u64> = taken.into_iter().map(|id| u64::from(id.get())).collect();

    let mut last = 0u64;
    for current in sorted {
        if current != last + 1 {
            break;
        }
        last = current;
    }

    u32::try_from(last + 1)
        .ok()
        .and_then(|n| FingerprintId::new(n).ok())
        .ok_or_else(|| Error::conflict("fingerprint slot space"))
}
