//! Pause gate

/// Decide whether a dequeued alert is processed
///
/// While paused, an alert for the prompt processed last is discarded. An
/// alert for any other prompt always passes, paused or not.
pub fn should_process(paused: bool, last_prompt: Option<usize>, prompt_id: usize) -> bool {
    !(paused && last_prompt == Some(prompt_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_truth_table() {
        let prompts = [None, Some(0), Some(1), Some(7)];

        for paused in [false, true] {
            for last in prompts {
                for id in [0usize, 1, 7] {
                    let expected = !paused || last != Some(id);
                    assert_eq!(
                        should_process(paused, last, id),
                        expected,
                        "paused={} last={:?} id={}",
                        paused,
                        last,
                        id
                    );
                }
            }
        }
    }

    #[test]
    fn test_first_alert_always_passes() {
        assert!(should_process(true, None, 0));
    }

    #[test]
    fn test_prompt_change_breaks_through_pause() {
        assert!(!should_process(true, Some(0), 0));
        assert!(should_process(true, Some(0), 2));
    }
}
