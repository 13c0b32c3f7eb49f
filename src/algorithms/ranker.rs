/// Selects the `k` highest scores as `(index, score)` pairs in descending order.
///
/// The sort is stable, so equal scores keep ascending index order.
pub fn top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.truncate(k);
    indexed
}

/// Top-K selection followed by the positivity filter.
///
/// Filtering happens after truncation: a non-positive score that made it into
/// the window is dropped without being replaced, so the result may hold fewer
/// than `k` entries.
pub fn positive_top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    top_k(scores, k)
        .into_iter()
        .filter(|&(_, score)| score > 0.0)
        .collect()
}
