//! Watchlist scan for large intraday moves against the previous close.

use chrono::{NaiveDate, Utc};
use magi_agents::{notify_best_effort, Brokerage, Notifier};
use magi_indicators::{detect_surge, SurgeAlert};
use magi_models::Bar;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info, warn};

/// Result of one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct SurgeReport {
    pub scanned: usize,
    pub skipped: usize,
    pub alerts: Vec<SurgeAlert>,
    pub notified: bool,
}

/// Close of the last completed session. A bar dated `today` is the
/// session in progress and is passed over.
pub fn previous_close(bars: &[Bar], today: NaiveDate) -> Option<f64> {
    bars.iter()
        .rev()
        .find(|b| b.timestamp.date_naive() < today)
        .map(|b| b.close)
}

pub fn alert_message(alerts: &[SurgeAlert]) -> String {
    let mut lines = vec![format!("Price alerts ({})", alerts.len())];
    lines.extend(alerts.iter().map(SurgeAlert::summary));
    lines.join("\n")
}

/// Check every watchlist symbol and send one combined notification when
/// anything moved past `threshold_pct`.
pub async fn scan_watchlist(
    broker: &dyn Brokerage,
    notifier: &dyn Notifier,
    watchlist: &[String],
    threshold_pct: f64,
) -> SurgeReport {
    let today = Utc::now().date_naive();
    let mut alerts = Vec::new();
    let mut skipped = 0;

    for symbol in watchlist {
        let bars = match broker.get_daily_bars(symbol, 5).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Bars unavailable, skipping");
                skipped += 1;
                continue;
            }
        };
        let Some(prev_close) = previous_close(&bars, today) else {
            debug!(symbol = %symbol, "No completed session, skipping");
            skipped += 1;
            continue;
        };
        let current = match broker.get_quote(symbol).await {
            Ok(quote) => quote.price.to_f64().unwrap_or(0.0),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Quote unavailable, skipping");
                skipped += 1;
                continue;
            }
        };

        if let Some(alert) = detect_surge(symbol, prev_close, current, threshold_pct) {
            info!(symbol = %symbol, change_pct = alert.change_pct, "Price alert");
            alerts.push(alert);
        }
    }

    let notified = if alerts.is_empty() {
        false
    } else {
        notify_best_effort(notifier, &alert_message(&alerts)).await
    };

    SurgeReport {
        scanned: watchlist.len(),
        skipped,
        alerts,
        notified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magi_agents::test_support::{daily_bars, MockBrokerage, RecordingNotifier};
    use magi_indicators::SurgeDirection;
    use rust_decimal_macros::dec;

    fn watchlist(symbols: &[&str]) -> Vec<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn todays_bar_is_not_the_previous_close() {
        let bars = daily_bars(&[90.0, 100.0, 104.0]);
        let today = bars[2].timestamp.date_naive();
        assert_eq!(previous_close(&bars, today), Some(100.0));

        let tomorrow = today.succ_opt().unwrap();
        assert_eq!(previous_close(&bars, tomorrow), Some(104.0));
        assert_eq!(previous_close(&bars[2..], today), None);
    }

    #[tokio::test]
    async fn one_notification_for_all_alerts() {
        let broker = MockBrokerage::new()
            .with_bars("AMD", daily_bars(&[100.0, 100.0, 101.0]))
            .with_quote("AMD", dec!(103))
            .with_bars("TSLA", daily_bars(&[200.0, 200.0, 199.0]))
            .with_quote("TSLA", dec!(190))
            .with_bars("AAPL", daily_bars(&[150.0, 150.0, 150.0]))
            .with_quote("AAPL", dec!(151));
        let notifier = RecordingNotifier::new();

        let report =
            scan_watchlist(&broker, &notifier, &watchlist(&["AMD", "TSLA", "AAPL"]), 2.0).await;

        assert_eq!(report.alerts.len(), 2);
        assert_eq!(report.alerts[0].direction, SurgeDirection::Surge);
        assert_eq!(report.alerts[1].direction, SurgeDirection::Crash);
        assert!(report.notified);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("SURGE AMD"));
        assert!(sent[0].contains("CRASH TSLA"));
    }

    #[tokio::test]
    async fn unavailable_symbols_are_skipped() {
        let broker = MockBrokerage::new()
            .with_bars("AMD", daily_bars(&[100.0, 100.0]))
            .with_quote("AMD", dec!(100.5));
        let notifier = RecordingNotifier::new();

        let report = scan_watchlist(&broker, &notifier, &watchlist(&["AMD", "NVDA"]), 2.0).await;

        assert_eq!(report.scanned, 2);
        assert_eq!(report.skipped, 1);
        assert!(report.alerts.is_empty());
        assert!(!report.notified);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn notification_failure_keeps_alerts() {
        let broker = MockBrokerage::new()
            .with_bars("AMD", daily_bars(&[100.0, 100.0]))
            .with_quote("AMD", dec!(95));
        let notifier = RecordingNotifier::failing();

        let report = scan_watchlist(&broker, &notifier, &watchlist(&["AMD"]), 2.0).await;
        assert_eq!(report.alerts.len(), 1);
        assert!(!report.notified);
    }
}
