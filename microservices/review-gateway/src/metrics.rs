//! Review campaign metrics
//!
//! An explicit observability context constructed once at startup and
//! injected into the flow driver and dispatcher.

use solara_telemetry::{Counter, Gauge, Histogram};

#[derive(Clone)]
pub struct ReviewMetrics {
    pub invites_sent: Counter,
    pub invites_accepted: Counter,
    pub invites_declined: Counter,
    pub calls_placed: Counter,
    pub thank_yous_sent: Counter,
    pub sms_latency: Histogram,
    pub active_conversations: Gauge,
}

impl ReviewMetrics {
    pub fn new() -> Self {
        Self {
            invites_sent: Counter::new("review_invites_sent_total"),
            invites_accepted: Counter::new("review_invites_accepted_total"),
            invites_declined: Counter::new("review_invites_declined_total"),
            calls_placed: Counter::new("review_calls_placed_total"),
            thank_yous_sent: Counter::new("review_thank_yous_sent_total"),
            sms_latency: Histogram::new("review_sms_send_latency_seconds"),
            active_conversations: Gauge::new("review_active_conversations"),
        }
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn expose(&self) -> String {
        let mut out = String::new();
        for counter in [
            &self.invites_sent,
            &self.invites_accepted,
            &self.invites_declined,
            &self.calls_placed,
            &self.thank_yous_sent,
        ] {
            out.push_str(&format!("# TYPE {} counter\n", counter.name()));
            out.push_str(&format!("{} {}\n", counter.name(), counter.get()));
        }

        out.push_str(&format!(
            "# TYPE {} gauge\n{} {}\n",
            self.active_conversations.name(),
            self.active_conversations.name(),
            self.active_conversations.get()
        ));

        let hist = &self.sms_latency;
        out.push_str(&format!("# TYPE {} summary\n", hist.name()));
        for q in [50.0, 90.0, 99.0] {
            out.push_str(&format!(
                "{}{{quantile=\"{}\"}} {}\n",
                hist.name(),
                q / 100.0,
                hist.percentile(q)
            ));
        }
        out.push_str(&format!("{}_count {}\n", hist.name(), hist.count()));
        out
    }
}

impl Default for ReviewMetrics {
    fn default() -> Self {
        Self::new()
    }
}
