use std::num::NonZeroUsize;

/// Partition `keys` into batches of at most `max_batch_size` keys.
///
/// Every key lands in exactly one batch, in iteration order. Only the last
/// batch may be short, and no batch is ever empty: zero keys give zero batches.
///
/// ```
/// use std::num::NonZeroUsize;
///
/// let batches = asg_upstreams::split(1..=25, NonZeroUsize::new(10).unwrap());
/// assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![10, 10, 5]);
/// ```
pub fn split<K, I>(keys: I, max_batch_size: NonZeroUsize) -> Vec<Vec<K>>
where
    I: IntoIterator<Item = K>,
{
    let max_batch_size = max_batch_size.get();
    let mut batches = Vec::new();
    let mut current = Vec::new();

    for key in keys {
        current.push(key);
        if current.len() == max_batch_size {
            batches.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}
