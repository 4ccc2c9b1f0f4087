use std::collections::HashMap;

use rand::Rng;

use crate::api::{Initiative, PrioritizedInitiative};

pub const MAX_SCORE: u8 = 100;

/// Display-only priority annotation, keyed by initiative id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportanceMap {
    scores: HashMap<u64, u8>,
}

impl ImportanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn randomize<R: Rng + ?Sized>(records: &[Initiative], rng: &mut R) -> Self {
        let scores = records
            .iter()
            .map(|r| (r.id, rng.gen_range(0..=MAX_SCORE)))
            .collect();
        Self { scores }
    }

    pub fn from_prioritized(items: &[PrioritizedInitiative]) -> Self {
        let scores = items.iter().map(|i| (i.id, i.score())).collect();
        Self { scores }
    }

    pub fn insert(&mut self, id: u64, score: u8) {
        self.scores.insert(id, score.min(MAX_SCORE));
    }

    pub fn get(&self, id: u64) -> Option<u8> {
        self.scores.get(&id).copied()
    }

    /// Score used for ordering; unscored records rank as 0.
    pub fn score(&self, id: u64) -> u8 {
        self.get(id).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn clear(&mut self) {
        self.scores.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn random_scores_cover_every_record_within_bounds() {
        let records: Vec<Initiative> = (1..=50)
            .map(|id| crate::tests::stub::initiative(id, crate::api::Status::Pending))
            .collect();
        let mut rng = StdRng::seed_from_u64(7);
        let map = ImportanceMap::randomize(&records, &mut rng);
        assert_eq!(map.len(), 50);
        assert!(records.iter().all(|r| map.get(r.id).unwrap() <= MAX_SCORE));
    }

    #[test]
    fn seeded_generator_is_reproducible() {
        let records: Vec<Initiative> = (1..=5)
            .map(|id| crate::tests::stub::initiative(id, crate::api::Status::Pending))
            .collect();
        let a = ImportanceMap::randomize(&records, &mut StdRng::seed_from_u64(42));
        let b = ImportanceMap::randomize(&records, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn prioritized_items_map_by_id_and_missing_scores_default_to_zero() {
        let items = vec![
            PrioritizedInitiative {
                id: 3,
                title: String::new(),
                priority_score: 75,
                ai_analysis: None,
            },
            PrioritizedInitiative {
                id: 9,
                title: String::new(),
                priority_score: 250,
                ai_analysis: None,
            },
        ];
        let map = ImportanceMap::from_prioritized(&items);
        assert_eq!(map.score(3), 75);
        assert_eq!(map.score(9), 100);
        assert_eq!(map.score(1), 0);
        assert_eq!(map.get(1), None);
    }

    #[test]
    fn insert_clamps() {
        let mut map = ImportanceMap::new();
        map.insert(1, 200);
        assert_eq!(map.score(1), 100);
        map.clear();
        assert!(map.is_empty());
    }
}
