mod config;
mod operator;

pub use config::{SessionWindowConfig, SessionWindowConfigBuilder};
pub use operator::{Session, SessionWindowOperator};

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[derive(Debug, Clone, Copy)]
    struct Event {
        t: i64,
    }

    fn operator() -> SessionWindowOperator<Event, &'static str, i64, i64> {
        let config = SessionWindowConfig::builder()
            .session_timeout(10)
            .timestamp_fn(|e: &Event| e.t)
            .key_fn(|_: &Event| "a")
            .new_acc(|| 0i64)
            .accumulate(|acc: &mut i64, _: &Event| *acc += 1)
            .combine(|acc: &mut i64, other: i64| *acc += other)
            .finish(|acc: i64| acc)
            .build()
            .unwrap();
        SessionWindowOperator::new(config)
    }

    // Scenario 1: overlapping events merge into one session.
    #[test]
    fn scenario_single_session_from_overlapping_events() {
        let mut op = operator();
        op.accept(Event { t: 1 });
        op.accept(Event { t: 5 });
        let sessions = op.accept_watermark(100);
        assert_eq!(sessions.len(), 1);
        assert_eq!((sessions[0].start, sessions[0].end, sessions[0].result), (1, 15, 2));
    }

    // Scenario 2: a gap larger than sessionTimeout produces two sessions.
    #[test]
    fn scenario_gap_larger_than_timeout_separates_sessions() {
        let mut op = operator();
        op.accept(Event { t: 1 });
        op.accept(Event { t: 20 });
        let mut sessions = op.accept_watermark(100);
        sessions.sort_by_key(|s| s.start);
        assert_eq!(sessions.len(), 2);
        assert_eq!((sessions[0].start, sessions[0].end), (1, 11));
        assert_eq!((sessions[1].start, sessions[1].end), (20, 30));
    }

    // Scenario 3 (out-of-order arrival, a bridging middle event). The merge
    // algorithm only extends/merges a candidate window when the event's own
    // interval overlaps it (`end_j >= t`); an event that arrives after a
    // window's end but before the next window's start starts a third,
    // separate window rather than bridging the two. Three sessions is the
    // correct output for this input (see DESIGN.md's Open Question
    // decisions for the full rationale).
    #[test]
    fn scenario_out_of_order_event_does_not_bridge_nonoverlapping_windows() {
        let mut op = operator();
        op.accept(Event { t: 1 });
        op.accept(Event { t: 30 });
        op.accept(Event { t: 15 });
        let mut sessions = op.accept_watermark(100);
        sessions.sort_by_key(|s| s.start);
        assert_eq!(sessions.len(), 3);
        assert_eq!((sessions[0].start, sessions[0].end), (1, 11));
        assert_eq!((sessions[1].start, sessions[1].end), (15, 25));
        assert_eq!((sessions[2].start, sessions[2].end), (30, 40));
    }

    // Scenario 4: a watermark with nothing live yields no output and no state.
    #[test]
    fn scenario_watermark_with_no_events_is_empty() {
        let mut op = operator();
        let sessions = op.accept_watermark(100);
        assert!(sessions.is_empty());
        assert_eq!(op.live_key_count(), 0);
        assert_eq!(op.live_deadline_count(), 0);
    }

    // P1: emission order is non-decreasing by end across separate watermark calls.
    #[test]
    fn p1_monotone_emission_across_watermarks() {
        let mut op = operator();
        op.accept(Event { t: 1 });
        op.accept(Event { t: 50 });
        let first = op.accept_watermark(12);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].end, 11);
        let second = op.accept_watermark(1000);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].end, 60);
    }

    // P2: every event lands in exactly one emitted session covering its timestamp.
    #[test]
    fn p2_every_event_covered_by_exactly_one_session() {
        let mut op = operator();
        let events = [1, 2, 3, 25, 26, 50];
        for t in events {
            op.accept(Event { t });
        }
        let sessions = op.complete();
        for t in events {
            let covering: Vec<_> = sessions
                .iter()
                .filter(|s| s.start <= t && t < s.end)
                .collect();
            assert_eq!(covering.len(), 1, "timestamp {t} covered by {covering:?}");
        }
    }

    // P3: gap semantics for two directly adjacent events of the same key.
    #[test]
    fn p3_gap_exactly_at_timeout_merges() {
        let mut op = operator();
        op.accept(Event { t: 0 });
        op.accept(Event { t: 10 });
        let sessions = op.complete();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].end, 20);
    }

    #[test]
    fn p3_gap_one_past_timeout_separates() {
        let mut op = operator();
        op.accept(Event { t: 0 });
        op.accept(Event { t: 11 });
        let mut sessions = op.complete();
        sessions.sort_by_key(|s| s.start);
        assert_eq!(sessions.len(), 2);
    }

    // P4: after complete(), no per-key state or deadlines survive.
    #[test]
    fn p4_complete_leaves_no_state() {
        let mut op = operator();
        op.accept(Event { t: 1 });
        op.accept(Event { t: 100 });
        op.complete();
        assert_eq!(op.live_key_count(), 0);
        assert_eq!(op.live_deadline_count(), 0);
    }

    // A repeated, non-advancing watermark is a no-op.
    #[test]
    fn idempotent_watermark_yields_no_output_on_repeat() {
        let mut op = operator();
        op.accept(Event { t: 1 });
        let first = op.accept_watermark(20);
        assert_eq!(first.len(), 1);
        let second = op.accept_watermark(20);
        assert!(second.is_empty());
    }

    #[test]
    fn distinct_keys_track_independent_window_lists() {
        let config = SessionWindowConfig::builder()
            .session_timeout(10)
            .timestamp_fn(|e: &Event| e.t)
            .key_fn(|e: &Event| if e.t < 50 { "a" } else { "b" })
            .new_acc(|| 0i64)
            .accumulate(|acc: &mut i64, _: &Event| *acc += 1)
            .combine(|acc: &mut i64, other: i64| *acc += other)
            .finish(|acc: i64| acc)
            .build()
            .unwrap();
        let mut op = SessionWindowOperator::new(config);
        op.accept(Event { t: 1 });
        op.accept(Event { t: 60 });
        let mut sessions = op.complete();
        sessions.sort_by_key(|s| s.start);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].key, "a");
        assert_eq!(sessions[1].key, "b");
    }
}
