use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Metrics は Prometheus メトリクスのヘルパー構造体である。
/// HTTP リクエスト数と許可判定の結果を記録する。
pub struct Metrics {
    pub http_requests_total: IntCounterVec,
    pub admission_decisions_total: IntCounterVec,
    registry: Registry,
}

impl Metrics {
    /// new は Prometheus メトリクスを初期化して返す。
    /// service_name はメトリクスの service ラベルに使用される。
    pub fn new(service_name: &str) -> Self {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests")
                .const_label("service", service_name),
            &["method", "path", "status"],
        )
        .expect("failed to create http_requests_total counter");

        let admission_decisions_total = IntCounterVec::new(
            Opts::new(
                "admission_decisions_total",
                "Total number of rate limit admission decisions",
            )
            .const_label("service", service_name),
            &["outcome", "period"],
        )
        .expect("failed to create admission_decisions_total counter");

        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("failed to register http_requests_total");
        registry
            .register(Box::new(admission_decisions_total.clone()))
            .expect("failed to register admission_decisions_total");

        Self {
            http_requests_total,
            admission_decisions_total,
            registry,
        }
    }

    /// record_http_request は HTTP リクエストカウンタをインクリメントする。
    pub fn record_http_request(&self, method: &str, path: &str, status: &str) {
        self.http_requests_total
            .with_label_values(&[method, path, status])
            .inc();
    }

    /// record_admission は許可判定の結果を記録する。
    /// 許可時の period は "none"、拒否時は超過したピリオド名。
    pub fn record_admission(&self, outcome: &str, period: &str) {
        self.admission_decisions_total
            .with_label_values(&[outcome, period])
            .inc();
    }

    /// gather_metrics は Prometheus テキストフォーマットでメトリクスを返す。
    /// /metrics エンドポイントのハンドラで使用する。
    pub fn gather_metrics(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}
