use prometheus::{
    Counter, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_created_total: IntCounterVec,
    pub order_transitions_total: IntCounterVec,
    pub wallet_credits_total: IntCounterVec,
    pub settled_amount_total: Counter,
    pub settlement_latency_seconds: HistogramVec,
    pub lock_contention_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_created_total = IntCounterVec::new(
            Opts::new("orders_created_total", "Orders created by order type"),
            &["order_type"],
        )
        .expect("valid orders_created_total metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new(
                "order_transitions_total",
                "Order transition attempts by transition and outcome",
            ),
            &["transition", "outcome"],
        )
        .expect("valid order_transitions_total metric");

        let wallet_credits_total = IntCounterVec::new(
            Opts::new("wallet_credits_total", "Wallet credits by source"),
            &["source"],
        )
        .expect("valid wallet_credits_total metric");

        let settled_amount_total = Counter::new(
            "settled_amount_total",
            "Sum of prices credited to drivers on completion",
        )
        .expect("valid settled_amount_total metric");

        let settlement_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "settlement_latency_seconds",
                "Latency of order completion including wallet credit",
            ),
            &["outcome"],
        )
        .expect("valid settlement_latency_seconds metric");

        let lock_contention_total = IntCounterVec::new(
            Opts::new(
                "lock_contention_total",
                "Requests rejected because a per-key lock wait expired",
            ),
            &["operation"],
        )
        .expect("valid lock_contention_total metric");

        registry
            .register(Box::new(orders_created_total.clone()))
            .expect("register orders_created_total");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(wallet_credits_total.clone()))
            .expect("register wallet_credits_total");
        registry
            .register(Box::new(settled_amount_total.clone()))
            .expect("register settled_amount_total");
        registry
            .register(Box::new(settlement_latency_seconds.clone()))
            .expect("register settlement_latency_seconds");
        registry
            .register(Box::new(lock_contention_total.clone()))
            .expect("register lock_contention_total");

        Self {
            registry,
            orders_created_total,
            order_transitions_total,
            wallet_credits_total,
            settled_amount_total,
            settlement_latency_seconds,
            lock_contention_total,
        }
    }

    pub fn record_transition<T>(&self, transition: &str, result: &Result<T, crate::error::AppError>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        self.order_transitions_total
            .with_label_values(&[transition, outcome])
            .inc();

        self.record_contention(transition, result);
    }

    /// Counts lock-wait expiries for any operation, order or wallet.
    pub fn record_contention<T>(&self, operation: &str, result: &Result<T, crate::error::AppError>) {
        if let Err(crate::error::AppError::Contended(_)) = result {
            self.lock_contention_total
                .with_label_values(&[operation])
                .inc();
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
