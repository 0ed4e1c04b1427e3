//! Greedy maximal marginal relevance.
//!
//! Picks `k` candidates that are relevant to the query but not redundant with
//! each other. The first pick is the candidate most similar to the query; each
//! further pick maximizes
//! `lambda * cos(query, c) - (1 - lambda) * max_{s in selected} cos(c, s)`.

/// Cosine similarity. Zero if either vector has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Indices into `candidates` in selection order; `min(k, candidates.len())`
/// entries, no index twice. Ties go to the lowest index.
pub fn mmr_select<V: AsRef<[f32]>>(
    query: &[f32],
    candidates: &[V],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    let n = candidates.len();
    let k = k.min(n);
    if k == 0 {
        return Vec::new();
    }

    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine(query, c.as_ref()))
        .collect();

    // Highest similarity to anything selected so far, per candidate.
    let mut redundancy = vec![f32::NEG_INFINITY; n];
    let mut chosen = vec![false; n];
    let mut selected = Vec::with_capacity(k);

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for i in (0..n).filter(|&i| !chosen[i]) {
            let score = if selected.is_empty() {
                relevance[i]
            } else {
                lambda * relevance[i] - (1.0 - lambda) * redundancy[i]
            };
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((i, score));
            }
        }
        let Some((pick, _)) = best else { break };

        chosen[pick] = true;
        selected.push(pick);
        for i in (0..n).filter(|&i| !chosen[i]) {
            let sim = cosine(candidates[pick].as_ref(), candidates[i].as_ref());
            redundancy[i] = redundancy[i].max(sim);
        }
    }

    selected
}
