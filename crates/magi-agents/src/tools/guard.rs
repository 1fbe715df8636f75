use magi_models::{DirectionStats, GuardConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GuardVerdict {
    Allow,
    Block { win_rate: f64 },
}

/// Block a direction whose track record is both poor and established.
///
/// Fewer than `min_losses` losses is too small a sample to act on.
pub fn evaluate_guard(stats: &DirectionStats, config: &GuardConfig) -> GuardVerdict {
    if !config.enabled || stats.losses < config.min_losses {
        return GuardVerdict::Allow;
    }
    match stats.win_rate() {
        Some(rate) if rate <= config.max_win_rate => GuardVerdict::Block { win_rate: rate },
        _ => GuardVerdict::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magi_models::Side;

    fn stats(wins: u32, losses: u32) -> DirectionStats {
        DirectionStats {
            provider_id: "groq".into(),
            side: Side::Buy,
            wins,
            losses,
        }
    }

    #[test]
    fn poor_record_blocks() {
        let verdict = evaluate_guard(&stats(1, 4), &GuardConfig::default());
        assert_eq!(verdict, GuardVerdict::Block { win_rate: 0.2 });
    }

    #[test]
    fn good_record_allows() {
        assert_eq!(evaluate_guard(&stats(7, 3), &GuardConfig::default()), GuardVerdict::Allow);
    }

    #[test]
    fn threshold_is_inclusive() {
        // 3 / 10 = 0.30
        assert!(matches!(
            evaluate_guard(&stats(3, 7), &GuardConfig::default()),
            GuardVerdict::Block { .. }
        ));
    }

    #[test]
    fn small_samples_allow() {
        assert_eq!(evaluate_guard(&stats(0, 2), &GuardConfig::default()), GuardVerdict::Allow);
        assert_eq!(evaluate_guard(&stats(0, 0), &GuardConfig::default()), GuardVerdict::Allow);
    }

    #[test]
    fn disabled_guard_allows() {
        let config = GuardConfig {
            enabled: false,
            ..GuardConfig::default()
        };
        assert_eq!(evaluate_guard(&stats(0, 10), &config), GuardVerdict::Allow);
    }
}
