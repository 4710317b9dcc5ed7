use std::cmp::Ordering;

use crate::occurrence::Occurrence;

/// Drops every occurrence whose byte range lies within another occurrence's
/// range. Of several occurrences spanning an identical range only the first
/// is kept. Survivors keep their relative order. Returns the number dropped.
pub(crate) fn drop_enclosed(occurrences: &mut Vec<Occurrence>) -> usize {
    if occurrences.len() < 2 {
        return 0;
    }

    // Outermost first: ascending start, then descending end, then aggregation order
    let mut order: Vec<usize> = (0..occurrences.len()).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (&occurrences[a], &occurrences[b]);
        x.byte_offset
            .cmp(&y.byte_offset)
            .then_with(|| y.byte_end().cmp(&x.byte_end()))
            .then_with(|| a.cmp(&b))
    });

    // Each survivor reaches further than every earlier one, so only the latest
    // survivor can enclose the next candidate
    let mut keep = vec![false; occurrences.len()];
    let mut outermost: Option<usize> = None;
    for index in order {
        let enclosed = outermost
            .map_or(false, |owner| occurrences[index].is_enclosed_by(&occurrences[owner]));
        if !enclosed {
            keep[index] = true;
            outermost = Some(index);
        }
    }

    let before = occurrences.len();
    let mut flags = keep.into_iter();
    occurrences.retain(|_| flags.next().unwrap_or(false));
    before - occurrences.len()
}

/// Sorts ascending by byte offset, ties broken by ascending byte length
pub(crate) fn sort_by_position(occurrences: &mut [Occurrence]) {
    occurrences.sort_by(compare_position);
}

fn compare_position(a: &Occurrence, b: &Occurrence) -> Ordering {
    a.byte_offset
        .cmp(&b.byte_offset)
        .then_with(|| a.byte_length.cmp(&b.byte_length))
}
