use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;

/// Core OTel metrics for the broker. Created once during scheduler init
/// and used to record counters/gauges on each operation.
pub struct Metrics {
    pub messages_created: Counter<u64>,
    pub messages_cancelled: Counter<u64>,
    pub messages_dispatched: Counter<u64>,
    pub messages_recovered: Counter<u64>,
    pub deliveries: Counter<u64>,
    pub schedule_pending: Gauge<u64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create metrics from the global meter provider. If no meter provider
    /// is configured (OTel disabled), the instruments are no-op.
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("herald");
        Self::from_meter(&meter)
    }

    /// Create metrics from a specific meter (used in tests with in-memory exporter).
    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            messages_created: meter
                .u64_counter("herald.messages.created")
                .with_description("Total messages accepted by create")
                .build(),
            messages_cancelled: meter
                .u64_counter("herald.messages.cancelled")
                .with_description("Total messages removed by cancel or bulk cancel")
                .build(),
            messages_dispatched: meter
                .u64_counter("herald.messages.dispatched")
                .with_description("Total messages handed to the delivery workers")
                .build(),
            messages_recovered: meter
                .u64_counter("herald.messages.recovered")
                .with_description("Messages restored from storage at startup")
                .build(),
            deliveries: meter
                .u64_counter("herald.deliveries")
                .with_description("Completed callback invocations by outcome")
                .build(),
            schedule_pending: meter
                .u64_gauge("herald.schedule.pending")
                .with_description("Messages currently waiting in the schedule index")
                .build(),
        }
    }

    pub fn record_create(&self) {
        self.messages_created.add(1, &[]);
    }

    pub fn record_cancel(&self, count: u64) {
        self.messages_cancelled.add(count, &[]);
    }

    pub fn record_dispatch(&self) {
        self.messages_dispatched.add(1, &[]);
    }

    pub fn record_recovered(&self, count: u64) {
        self.messages_recovered.add(count, &[]);
    }

    pub fn record_delivery(&self, delivered: bool) {
        let outcome = if delivered { "success" } else { "failure" };
        self.deliveries.add(1, &[KeyValue::new("outcome", outcome)]);
    }

    pub fn set_pending(&self, count: u64) {
        self.schedule_pending.record(count, &[]);
    }
}
