//! Event normalization applied to every aligner's output.

use super::types::SubtitleEvent;

/// Make an event list safe to burn into video.
///
/// After this call the events are sorted by start time, every event has
/// non-empty text and `end_ms >= start_ms`, and no event ends after the
/// next one starts.
pub fn normalize_events(events: Vec<SubtitleEvent>) -> Vec<SubtitleEvent> {
    let mut events: Vec<SubtitleEvent> = events
        .into_iter()
        .map(|mut e| {
            e.text = e.text.trim().to_string();
            e
        })
        .filter(|e| !e.text.is_empty())
        .collect();

    // Stable: equal starts keep aligner order
    events.sort_by_key(|e| e.start_ms);

    for e in events.iter_mut() {
        if e.end_ms < e.start_ms {
            e.end_ms = e.start_ms;
        }
    }

    for i in 1..events.len() {
        let next_start = events[i].start_ms;
        let prev = &mut events[i - 1];
        if prev.end_ms > next_start {
            prev.end_ms = next_start;
        }
    }

    events
}

/// Check the invariants `normalize_events` establishes.
pub fn is_normalized(events: &[SubtitleEvent]) -> bool {
    events.iter().all(|e| e.end_ms >= e.start_ms && !e.text.trim().is_empty())
        && events
            .windows(2)
            .all(|w| w[0].start_ms <= w[1].start_ms && w[0].end_ms <= w[1].start_ms)
}
