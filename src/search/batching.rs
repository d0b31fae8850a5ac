use crate::model::SessionInfo;

/// Sessions searched together in one full-search step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchBatch {
    pub session_ids: Vec<String>,
    pub estimated_events: u64,
}

impl SearchBatch {
    fn push(&mut self, session: &SessionInfo) {
        self.session_ids.push(session.id.clone());
        self.estimated_events += session.event_count;
    }

    pub fn is_empty(&self) -> bool {
        self.session_ids.is_empty()
    }
}

/// Group sessions into batches of roughly `target` events.
///
/// A session at or above the target is a batch on its own. Smaller sessions
/// accumulate, in order, until the running total reaches the target.
pub fn plan_batches(sessions: &[SessionInfo], target: u64) -> Vec<SearchBatch> {
    let mut batches = Vec::new();
    let mut current = SearchBatch::default();

    for session in sessions {
        if session.event_count >= target {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
            }
            let mut single = SearchBatch::default();
            single.push(session);
            batches.push(single);
            continue;
        }

        current.push(session);
        if current.estimated_events >= target {
            batches.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Sum of estimated events over all batches
pub fn estimated_total(batches: &[SearchBatch]) -> u64 {
    batches.iter().map(|b| b.estimated_events).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions(counts: &[u64]) -> Vec<SessionInfo> {
        counts
            .iter()
            .enumerate()
            .map(|(i, &event_count)| SessionInfo {
                id: format!("s{}", i),
                start_time: (100 - i) as f64,
                event_count,
            })
            .collect()
    }

    fn shape(batches: &[SearchBatch]) -> Vec<(usize, u64)> {
        batches
            .iter()
            .map(|b| (b.session_ids.len(), b.estimated_events))
            .collect()
    }

    #[test]
    fn test_small_sessions_close_batch_at_target() {
        let batches = plan_batches(&sessions(&[800, 1500]), 2000);
        assert_eq!(shape(&batches), vec![(2, 2300)]);
        assert_eq!(batches[0].session_ids, vec!["s0", "s1"]);
    }

    #[test]
    fn test_large_session_is_singleton() {
        let batches = plan_batches(&sessions(&[300, 5000, 400, 200]), 2000);
        assert_eq!(shape(&batches), vec![(1, 300), (1, 5000), (2, 600)]);
    }

    #[test]
    fn test_exact_target_is_singleton() {
        let batches = plan_batches(&sessions(&[2000, 1999, 1]), 2000);
        assert_eq!(shape(&batches), vec![(1, 2000), (2, 2000)]);
    }

    #[test]
    fn test_every_session_lands_in_exactly_one_batch() {
        let input = sessions(&[10, 2500, 700, 700, 700, 90, 3000, 1]);
        let batches = plan_batches(&input, 2000);

        let mut seen: Vec<String> = batches.iter().flat_map(|b| b.session_ids.clone()).collect();
        let expected: Vec<String> = input.iter().map(|s| s.id.clone()).collect();
        assert_eq!(seen, expected);
        seen.dedup();
        assert_eq!(seen.len(), input.len());
        assert_eq!(estimated_total(&batches), input.iter().map(|s| s.event_count).sum::<u64>());
    }

    #[test]
    fn test_batch_without_last_session_stays_below_target() {
        let input = sessions(&[10, 2500, 700, 700, 700, 90, 3000, 1, 1999, 1999]);
        let by_id: std::collections::HashMap<_, _> =
            input.iter().map(|s| (s.id.clone(), s.event_count)).collect();

        for batch in plan_batches(&input, 2000) {
            if batch.session_ids.len() < 2 {
                continue;
            }
            let head = &batch.session_ids[..batch.session_ids.len() - 1];
            let total: u64 = head.iter().map(|id| by_id[id]).sum();
            assert!(total < 2000, "{:?}", batch);
        }
    }

    #[test]
    fn test_no_sessions_no_batches() {
        assert!(plan_batches(&[], 2000).is_empty());
    }
}
