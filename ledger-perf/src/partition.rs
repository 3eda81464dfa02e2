//! Work division across worker threads

/// Split `total` requests over `workers` threads.
///
/// The first `total % workers` workers take one extra request, so shares
/// differ by at most one. Zero workers is treated as one.
pub fn divide_work(total: u64, workers: usize) -> Vec<u64> {
    let workers = workers.max(1);
    let fixed = total / workers as u64;
    let extra = (total % workers as u64) as usize;

    (0..workers)
        .map(|i| if i < extra { fixed + 1 } else { fixed })
        .collect()
}

/// Deal `items` over at most `lanes` lanes in order: lane `i` gets items
/// `i`, `i + lanes`, `i + 2 * lanes`, ...
pub fn round_robin<T>(items: Vec<T>, lanes: usize) -> Vec<Vec<T>> {
    let lanes = lanes.max(1).min(items.len());
    let mut out: Vec<Vec<T>> = (0..lanes).map(|_| Vec::new()).collect();
    for (i, item) in items.into_iter().enumerate() {
        out[i % lanes].push(item);
    }
    out
}
