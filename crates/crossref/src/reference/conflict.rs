//
// reference/conflict.rs
//
// Span conflict resolution for detector output
//

use std::collections::HashSet;

use super::types::DetectedSpan;

/// Resolve overlapping detections for one document into a non-overlapping set.
///
/// 1. Exact `{start, end}` duplicates are dropped, keeping the first occurrence.
/// 2. Remaining candidates are ordered by length (longest first), ties by
///    start offset (earliest first).
/// 3. Candidates are accepted greedily; one that overlaps any accepted span is
///    rejected.
///
/// The result is returned in ascending start order. This favors span length
/// over match count: a longer match beats several shorter ones it covers,
/// including a contained shorter match that points at a more specific target.
pub fn resolve_conflicts(candidates: Vec<DetectedSpan>) -> Vec<DetectedSpan> {
    let mut seen = HashSet::new();
    let mut unique: Vec<DetectedSpan> = candidates
        .into_iter()
        .filter(|span| !span.is_empty())
        .filter(|span| seen.insert((span.start, span.end)))
        .collect();

    // Stable sort keeps detector order among identical (length, start) pairs
    unique.sort_by(|a, b| b.len().cmp(&a.len()).then(a.start.cmp(&b.start)));

    let mut accepted: Vec<DetectedSpan> = Vec::with_capacity(unique.len());
    for span in unique {
        if accepted.iter().any(|kept| kept.overlaps(&span)) {
            log::trace!(
                "Rejecting detected span {}..{} ({:?}): overlaps an accepted match",
                span.start,
                span.end,
                span.display
            );
            continue;
        }
        accepted.push(span);
    }

    accepted.sort_by_key(|span| span.start);
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize, display: &str) -> DetectedSpan {
        DetectedSpan::new(start, end, display, display)
    }

    fn bounds(spans: &[DetectedSpan]) -> Vec<(usize, usize, &str)> {
        spans.iter().map(|s| (s.start, s.end, s.display.as_str())).collect()
    }

    #[test]
    fn test_longest_span_wins_over_overlapping_neighbors() {
        let resolved = resolve_conflicts(vec![
            span(0, 5, "Alpha"),
            span(2, 8, "AlphaBeta"),
            span(6, 10, "Beta"),
        ]);
        assert_eq!(bounds(&resolved), vec![(2, 8, "AlphaBeta")]);
    }

    #[test]
    fn test_disjoint_spans_kept_in_start_order() {
        let resolved = resolve_conflicts(vec![span(5, 9, "B"), span(0, 4, "A")]);
        assert_eq!(bounds(&resolved), vec![(0, 4, "A"), (5, 9, "B")]);
    }

    #[test]
    fn test_exact_duplicates_keep_first_occurrence() {
        let resolved = resolve_conflicts(vec![
            DetectedSpan::new(3, 7, "Beta", "first.md"),
            DetectedSpan::new(3, 7, "Beta", "second.md"),
        ]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].target, "first.md");
    }

    #[test]
    fn test_equal_length_ties_prefer_earliest_start() {
        let resolved = resolve_conflicts(vec![span(2, 6, "late"), span(0, 4, "early")]);
        assert_eq!(bounds(&resolved), vec![(0, 4, "early")]);
    }

    #[test]
    fn test_touching_spans_do_not_conflict() {
        let resolved = resolve_conflicts(vec![span(0, 4, "A"), span(4, 8, "B")]);
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_earlier_shorter_span_survives_when_disjoint_from_longer() {
        // Longest is accepted first; a shorter span to its left that does not
        // overlap it is still kept.
        let resolved = resolve_conflicts(vec![span(10, 20, "long"), span(0, 4, "short")]);
        assert_eq!(bounds(&resolved), vec![(0, 4, "short"), (10, 20, "long")]);
    }

    #[test]
    fn test_contained_specific_match_loses_to_longer_match() {
        // Known behavior: the contained span has a more specific target but is
        // dropped because the enclosing match is longer.
        let resolved = resolve_conflicts(vec![
            DetectedSpan::new(0, 13, "Machine Learning", "ml.md"),
            DetectedSpan::new(8, 13, "Learning", "learning-theory.md"),
        ]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].target, "ml.md");
    }

    #[test]
    fn test_empty_spans_are_ignored() {
        let resolved = resolve_conflicts(vec![span(3, 3, ""), span(0, 2, "ok")]);
        assert_eq!(bounds(&resolved), vec![(0, 2, "ok")]);
    }

    #[test]
    fn test_empty_input() {
        assert!(resolve_conflicts(Vec::new()).is_empty());
    }
}
