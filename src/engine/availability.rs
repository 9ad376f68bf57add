use crate::model::*;

/// Free sub-ranges of `window` once every `occupied` span is taken out.
/// `occupied` need not be sorted or disjoint.
pub fn free_within(window: &Span, occupied: &[Span]) -> Vec<Span> {
    let mut busy: Vec<Span> = occupied
        .iter()
        .filter(|s| s.overlaps(window))
        .copied()
        .collect();
    busy.sort_by_key(|s| s.start);

    let mut free = Vec::new();
    let mut cursor = window.start;
    for span in coalesce(&busy) {
        if span.start > cursor {
            free.push(Span::new(cursor, span.start));
        }
        cursor = cursor.max(span.end);
        if cursor >= window.end {
            return free;
        }
    }
    if cursor < window.end {
        free.push(Span::new(cursor, window.end));
    }
    free
}

/// Collapse spans sorted by start into disjoint spans. Touching spans merge,
/// so back-to-back visits leave no zero-length gap.
pub fn coalesce(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::with_capacity(sorted.len());
    for &span in sorted {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}
