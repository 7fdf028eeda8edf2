//! Candidate selection strategies

use rand::seq::SliceRandom;
use rand::Rng;
use scrapeshield_domain::SelectionStrategy;

/// A selectable proxy: its id and current score.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub score: f64,
}

/// Picks one candidate per `strategy`.
///
/// `cursor` is the persisted round-robin position, advanced by sequential
/// selection only.
pub fn select<R: Rng + ?Sized>(
    strategy: SelectionStrategy,
    candidates: &[Candidate],
    cursor: &mut usize,
    rng: &mut R,
) -> Option<String> {
    if candidates.is_empty() {
        return None;
    }
    match strategy {
        SelectionStrategy::Sequential => {
            let picked = &candidates[*cursor % candidates.len()];
            *cursor = cursor.wrapping_add(1);
            Some(picked.id.clone())
        }
        SelectionStrategy::Random => candidates.choose(rng).map(|c| c.id.clone()),
        SelectionStrategy::Performance => candidates
            .iter()
            .map(|c| (c, c.score * rng.gen_range(0.8..=1.2)))
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(c, _)| c.id.clone()),
    }
}
