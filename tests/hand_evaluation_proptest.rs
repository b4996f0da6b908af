/// Property-based tests for the 7-card evaluator.
///
/// These check structural invariants that must hold for any legal
/// combination of hole and community cards, not specific hand categories
/// (those are pinned down by the unit tests next to the evaluator).
use holdem_table::{Card, HandRank, HandValue, Suit, compare};
use proptest::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeSet;

fn full_deck() -> Vec<Card> {
    let mut cards = Vec::with_capacity(52);
    for value in 2u8..=14 {
        for suit in Suit::ALL {
            cards.push(Card(value, suit));
        }
    }
    cards
}

/// Strategy for `n` distinct cards drawn from a real deck.
fn unique_cards_strategy(n: usize) -> impl Strategy<Value = Vec<Card>> {
    proptest::sample::subsequence(full_deck(), n)
}

fn evaluate(hole: &[Card], community: &[Card]) -> HandValue {
    holdem_table::game::eval::evaluate(hole, community).unwrap()
}

proptest! {
    #[test]
    fn test_evaluation_uses_exactly_five_cards(cards in unique_cards_strategy(7)) {
        let value = evaluate(&cards[..2], &cards[2..]);
        let used = value.hole_card_indexes.len() + value.community_card_indexes.len();
        prop_assert_eq!(used, 5);

        let hole_set: BTreeSet<_> = value.hole_card_indexes.iter().collect();
        let community_set: BTreeSet<_> = value.community_card_indexes.iter().collect();
        prop_assert_eq!(hole_set.len(), value.hole_card_indexes.len());
        prop_assert_eq!(community_set.len(), value.community_card_indexes.len());
        prop_assert!(value.hole_card_indexes.iter().all(|&i| i < 2));
        prop_assert!(value.community_card_indexes.iter().all(|&i| i < 5));
    }

    #[test]
    fn test_evaluation_is_deterministic(cards in unique_cards_strategy(7)) {
        let a = evaluate(&cards[..2], &cards[2..]);
        let b = evaluate(&cards[..2], &cards[2..]);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn test_evaluation_ignores_community_order(
        cards in unique_cards_strategy(7),
        rotation in 0usize..5,
    ) {
        let baseline = evaluate(&cards[..2], &cards[2..]);

        let mut rotated = cards[2..].to_vec();
        rotated.rotate_left(rotation);
        let permuted = evaluate(&cards[..2], &rotated);

        // Provenance indexes may shift with the input order, but the
        // strength must not.
        prop_assert_eq!(baseline.rank, permuted.rank);
        prop_assert_eq!(baseline.values, permuted.values);
    }

    #[test]
    fn test_evaluation_ignores_hole_order(cards in unique_cards_strategy(7)) {
        let baseline = evaluate(&cards[..2], &cards[2..]);
        let swapped = evaluate(&[cards[1], cards[0]], &cards[2..]);
        prop_assert_eq!(baseline.rank, swapped.rank);
        prop_assert_eq!(baseline.values, swapped.values);
    }

    #[test]
    fn test_compare_is_antisymmetric(cards in unique_cards_strategy(9)) {
        // Two players sharing a board of 5.
        let board = &cards[4..];
        let a = evaluate(&cards[..2], board);
        let b = evaluate(&cards[2..4], board);

        let forward = compare(Some(&a), Some(&b));
        let backward = compare(Some(&b), Some(&a));
        prop_assert_eq!(forward, backward.reverse());
    }

    #[test]
    fn test_any_hand_beats_a_folded_hand(cards in unique_cards_strategy(7)) {
        let value = evaluate(&cards[..2], &cards[2..]);
        prop_assert_eq!(compare(Some(&value), None), Ordering::Greater);
        prop_assert_eq!(compare(None, Some(&value)), Ordering::Less);
    }

    #[test]
    fn test_values_stay_in_card_range(cards in unique_cards_strategy(7)) {
        let value = evaluate(&cards[..2], &cards[2..]);
        prop_assert!(!value.values.is_empty());
        prop_assert!(value.values.iter().all(|&v| (2..=14).contains(&v)));
    }

    #[test]
    fn test_suited_board_ranks_at_least_flush(
        hole in proptest::sample::subsequence(
            full_deck()
                .into_iter()
                .filter(|c| c.1 != Suit::Spade)
                .collect::<Vec<_>>(),
            2,
        )
    ) {
        // A flush sits on the board; off-suit hole cards can't undo it.
        let board = [
            Card(2, Suit::Spade),
            Card(7, Suit::Spade),
            Card(9, Suit::Spade),
            Card(11, Suit::Spade),
            Card(13, Suit::Spade),
        ];
        let value = evaluate(&hole, &board);
        prop_assert!(value.rank >= HandRank::Flush);
    }
}
