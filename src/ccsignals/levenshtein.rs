/// Character-level Levenshtein distance (insertions, deletions and
/// substitutions all cost 1). Runs in O(len(a) * len(b)) time and
/// O(min(len)) memory.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };

    if short.is_empty() {
        return long.len();
    }

    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut curr = vec![0usize; short.len() + 1];

    for (i, lc) in long.iter().enumerate() {
        curr[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let substitution = prev[j] + usize::from(lc != sc);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}

/// Levenshtein distance if it is at most `limit`, otherwise `None`.
///
/// The common prefix and suffix are skipped and only a diagonal band of
/// width `2 * limit + 1` is filled, stopping early once every cell in a row
/// exceeds `limit`. Cost is O(len * limit) instead of O(len(a) * len(b)).
pub fn levenshtein_distance_bounded(a: &str, b: &str, limit: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let (a, b) = (&a[prefix..], &b[prefix..]);
    let suffix = a.iter().rev().zip(b.iter().rev()).take_while(|(x, y)| x == y).count();
    let (a, b) = (&a[..a.len() - suffix], &b[..b.len() - suffix]);

    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    if long.len() - short.len() > limit {
        return None;
    }
    if short.is_empty() {
        return Some(long.len());
    }

    let over = limit + 1;
    let m = short.len();
    let mut prev: Vec<usize> = (0..=m).map(|j| j.min(over)).collect();
    let mut curr = vec![over; m + 1];

    for (i, lc) in long.iter().enumerate().map(|(i, c)| (i + 1, c)) {
        let lo = i.saturating_sub(limit).max(1);
        let hi = (i + limit).min(m);
        // Cells just outside the band must read as "too far".
        curr[lo - 1] = if lo == 1 { i.min(over) } else { over };
        if hi == i + limit {
            prev[hi] = over;
        }

        let mut row_min = curr[lo - 1];
        for j in lo..=hi {
            let substitution = prev[j - 1] + usize::from(*lc != short[j - 1]);
            let value = substitution.min(prev[j] + 1).min(curr[j - 1] + 1).min(over);
            curr[j] = value;
            row_min = row_min.min(value);
        }
        if row_min > limit {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    Some(prev[m]).filter(|&d| d <= limit)
}

/// Normalized edit distance, exact only while it stays below `cap`.
///
/// Once the distance is known to reach `cap` the comparison stops and a
/// value of at least `cap` is returned, which is all a threshold decision
/// needs.
pub fn normalized_edit_distance_capped(a: &str, b: &str, cap: f64) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 || cap <= 0.0 {
        return 0.0;
    }
    // Largest integer distance whose ratio is still below the cap
    let limit = ((cap * max_len as f64).ceil() as usize).saturating_sub(1);
    let distance = levenshtein_distance_bounded(a, b, limit).unwrap_or(limit + 1);
    (distance as f64 / max_len as f64).clamp(0.0, 1.0)
}

/// Levenshtein distance divided by the longer length, clamped to [0, 1].
/// Two empty strings are identical (0.0).
pub fn normalized_edit_distance(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    let distance = levenshtein_distance(a, b) as f64 / max_len as f64;
    distance.clamp(0.0, 1.0)
}
