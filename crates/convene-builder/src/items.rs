//! The Lost-at-Sea survival item table
//!
//! Fifteen items salvageable from a sinking yacht, ranked by the canonical
//! expert answer key (1 is most useful). The ranking is the ground truth
//! for every rating question: for any pair, the lower-ranked number wins.

use convene_types::{RatingQuestion, StudyError, StudyResult};
use rand::seq::SliceRandom;
use rand::Rng;

/// One salvageable item with its expert ranking.
#[derive(Clone, Copy, Debug)]
pub struct SurvivalItem {
    pub name: &'static str,
    pub ranking: u32,
}

/// The canonical expert ranking.
pub const SURVIVAL_ITEMS: &[SurvivalItem] = &[
    SurvivalItem { name: "mirror", ranking: 1 },
    SurvivalItem { name: "oilCan", ranking: 2 },
    SurvivalItem { name: "water", ranking: 3 },
    SurvivalItem { name: "rations", ranking: 4 },
    SurvivalItem { name: "sheeting", ranking: 5 },
    SurvivalItem { name: "chocolate", ranking: 6 },
    SurvivalItem { name: "fishingKit", ranking: 7 },
    SurvivalItem { name: "rope", ranking: 8 },
    SurvivalItem { name: "cushion", ranking: 9 },
    SurvivalItem { name: "sharkRepellent", ranking: 10 },
    SurvivalItem { name: "rum", ranking: 11 },
    SurvivalItem { name: "radio", ranking: 12 },
    SurvivalItem { name: "map", ranking: 13 },
    SurvivalItem { name: "netting", ranking: 14 },
    SurvivalItem { name: "sextant", ranking: 15 },
];

pub fn item_ranking(name: &str) -> Option<u32> {
    SURVIVAL_ITEMS
        .iter()
        .find(|item| item.name == name)
        .map(|item| item.ranking)
}

/// Ground-truth answer for an item pair: the more useful of the two.
pub fn pair_answer(item1: &str, item2: &str) -> StudyResult<String> {
    let ranking1 = item_ranking(item1)
        .ok_or_else(|| StudyError::Structural(format!("unknown survival item {item1}")))?;
    let ranking2 = item_ranking(item2)
        .ok_or_else(|| StudyError::Structural(format!("unknown survival item {item2}")))?;
    if ranking1 < ranking2 {
        Ok(item1.to_string())
    } else {
        Ok(item2.to_string())
    }
}

pub fn rating_question(id: u32, item1: &str, item2: &str) -> RatingQuestion {
    RatingQuestion {
        id,
        question_text: "Choose the item that is more helpful for your survival.".to_string(),
        item1: item1.to_string(),
        item2: item2.to_string(),
    }
}

/// Sample `count` distinct unordered item pairs as rating questions with
/// ids `0..count`. Deterministic for a fixed rng seed.
pub fn sample_pairs(count: usize, rng: &mut impl Rng) -> StudyResult<Vec<RatingQuestion>> {
    let mut pairs = Vec::new();
    for (index, first) in SURVIVAL_ITEMS.iter().enumerate() {
        for second in &SURVIVAL_ITEMS[index + 1..] {
            pairs.push((first.name, second.name));
        }
    }
    if count > pairs.len() {
        return Err(StudyError::Structural(format!(
            "asked for {count} item pairs but only {} exist",
            pairs.len()
        )));
    }
    pairs.shuffle(rng);
    pairs.truncate(count);
    Ok(pairs
        .into_iter()
        .enumerate()
        .map(|(id, (item1, item2))| rating_question(id as u32, item1, item2))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn mirror_beats_sextant() {
        assert_eq!(pair_answer("mirror", "sextant").unwrap(), "mirror");
        assert_eq!(pair_answer("sextant", "mirror").unwrap(), "mirror");
    }

    #[test]
    fn unknown_item_is_rejected() {
        let err = pair_answer("anchor", "mirror").unwrap_err();
        assert!(matches!(err, StudyError::Structural(_)));
    }

    #[test]
    fn rankings_are_unique() {
        let mut rankings: Vec<u32> = SURVIVAL_ITEMS.iter().map(|item| item.ranking).collect();
        rankings.sort_unstable();
        rankings.dedup();
        assert_eq!(rankings.len(), SURVIVAL_ITEMS.len());
    }

    #[test]
    fn sampled_pairs_are_distinct_and_seed_stable() {
        let mut rng = StdRng::seed_from_u64(7);
        let first = sample_pairs(10, &mut rng).unwrap();
        assert_eq!(first.len(), 10);
        for (index, question) in first.iter().enumerate() {
            assert_eq!(question.id, index as u32);
            assert_ne!(question.item1, question.item2);
        }

        let mut rng = StdRng::seed_from_u64(7);
        let second = sample_pairs(10, &mut rng).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cannot_sample_more_pairs_than_exist() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(sample_pairs(1000, &mut rng).is_err());
    }
}
