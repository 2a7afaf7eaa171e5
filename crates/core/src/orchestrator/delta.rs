//! Finding the move where the evaluation swung the most

use std::collections::BTreeMap;

use crate::engine::Score;

/// Score used for `index` when looking for swings: the ANALYSE score when
/// there is one, otherwise the PREVIEW score.
pub fn merged_score(
    preview: &BTreeMap<usize, Score>,
    analyse: &BTreeMap<usize, Score>,
    index: usize,
) -> Option<f32> {
    analyse
        .get(&index)
        .or_else(|| preview.get(&index))
        .map(|score| score.value)
}

/// Returns the move index `i` with the largest `|s(i) - s(i - 1)|` over
/// consecutive moves that both have a score.
///
/// Scores are merged per index with [`merged_score`]. Indices are scanned in
/// ascending order and only a strictly larger swing replaces the best one, so
/// ties go to the earliest move. Returns `None` when no two consecutive moves
/// are scored.
pub fn find_biggest_change_move(
    preview: &BTreeMap<usize, Score>,
    analyse: &BTreeMap<usize, Score>,
) -> Option<usize> {
    let last = preview.keys().chain(analyse.keys()).max().copied()?;
    let mut best: Option<(usize, f32)> = None;

    for index in 1..=last {
        let (Some(before), Some(after)) = (
            merged_score(preview, analyse, index - 1),
            merged_score(preview, analyse, index),
        ) else {
            continue;
        };

        let delta = (after - before).abs();
        if best.map_or(true, |(_, largest)| delta > largest) {
            best = Some((index, delta));
        }
    }

    best.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(values: &[(usize, f32)]) -> BTreeMap<usize, Score> {
        values
            .iter()
            .map(|&(index, value)| {
                let score = Score {
                    value,
                    is_mate: false,
                    mate_in: 0,
                    depth: 12,
                    nodes: 0,
                };
                (index, score)
            })
            .collect()
    }

    #[test]
    fn test_preview_only() {
        let preview = scores(&[(0, 0.0), (1, 0.2), (2, -1.5), (3, -1.4)]);
        assert_eq!(find_biggest_change_move(&preview, &BTreeMap::new()), Some(2));
    }

    #[test]
    fn test_analyse_scores_take_precedence() {
        let preview = scores(&[(0, 0.0), (1, 0.2), (2, -1.5), (3, -1.4)]);
        // Deeper search found that move 2 was fine and move 3 was the mistake
        let analyse = scores(&[(2, 0.1), (3, -2.0)]);
        assert_eq!(find_biggest_change_move(&preview, &analyse), Some(3));
    }

    #[test]
    fn test_ties_favor_earliest_move() {
        let preview = scores(&[(0, 0.0), (1, 1.0), (2, 0.0), (3, 1.0)]);
        assert_eq!(find_biggest_change_move(&preview, &BTreeMap::new()), Some(1));
    }

    #[test]
    fn test_gaps_are_skipped() {
        let preview = scores(&[(0, 0.0), (2, 5.0), (3, 4.5)]);
        assert_eq!(find_biggest_change_move(&preview, &BTreeMap::new()), Some(3));
    }

    #[test]
    fn test_not_enough_scores() {
        assert_eq!(find_biggest_change_move(&BTreeMap::new(), &BTreeMap::new()), None);
        let single = scores(&[(4, 1.0)]);
        assert_eq!(find_biggest_change_move(&single, &BTreeMap::new()), None);
    }
}
