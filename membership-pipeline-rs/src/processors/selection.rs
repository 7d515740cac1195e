//! Member selection from finished probability tables.

/// Probability cut actually applied to `probabilities`.
///
/// Lowered to the highest probability present so that at least the most
/// probable star is selected.
pub fn effective_cut(prob_cut: f64, probabilities: &[f64]) -> f64 {
    probabilities
        .iter()
        .copied()
        .filter(|p| p.is_finite())
        .reduce(f64::max)
        .map_or(prob_cut, |max| prob_cut.min(max))
}

/// Catalog rows selected as members.
///
/// Only rows in `accept_mask` are eligible; the cut is derived from the
/// probabilities of those rows.
pub fn select_members(probabilities: &[f64], accept_mask: &[bool], prob_cut: f64) -> Vec<usize> {
    let eligible: Vec<(usize, f64)> = probabilities
        .iter()
        .zip(accept_mask)
        .enumerate()
        .filter(|(_, (_, accepted))| **accepted)
        .map(|(i, (p, _))| (i, *p))
        .collect();

    let values: Vec<f64> = eligible.iter().map(|(_, p)| *p).collect();
    let cut = effective_cut(prob_cut, &values);

    eligible
        .into_iter()
        .filter(|(_, p)| *p >= cut)
        .map(|(i, _)| i)
        .collect()
}
