//! Prometheus metrics.
//!
//! HTTP metrics are recorded by the API middleware; invoice counters are
//! driven by the event listener so they only count committed invoices.

use prometheus::{
    Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

/// Registered metric handles plus the registry that renders them.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    invoices_issued_total: Counter,
    invoices_voided_total: Counter,
    invoice_revenue_minor_total: Counter,
}

impl core::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// # Errors
    ///
    /// Fails if a metric with the same name is already registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("spadesk_http_requests_total", "HTTP requests by route and status"),
            &["method", "route", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "spadesk_http_request_duration_seconds",
                "HTTP request latency in seconds",
            ),
            &["method", "route"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        let invoices_issued_total =
            Counter::with_opts(Opts::new("spadesk_invoices_issued_total", "Invoices issued"))?;
        registry.register(Box::new(invoices_issued_total.clone()))?;

        let invoices_voided_total =
            Counter::with_opts(Opts::new("spadesk_invoices_voided_total", "Invoices voided"))?;
        registry.register(Box::new(invoices_voided_total.clone()))?;

        let invoice_revenue_minor_total = Counter::with_opts(Opts::new(
            "spadesk_invoice_revenue_minor_total",
            "Grand total of issued invoices in minor currency units",
        ))?;
        registry.register(Box::new(invoice_revenue_minor_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            invoices_issued_total,
            invoices_voided_total,
            invoice_revenue_minor_total,
        })
    }

    pub fn observe_request(&self, method: &str, route: &str, status: u16, seconds: f64) {
        self.http_requests_total
            .with_label_values(&[method, route, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, route])
            .observe(seconds);
    }

    pub fn invoice_issued(&self, grand_total_minor: i64) {
        self.invoices_issued_total.inc();
        if grand_total_minor > 0 {
            self.invoice_revenue_minor_total.inc_by(grand_total_minor as f64);
        }
    }

    pub fn invoice_voided(&self) {
        self.invoices_voided_total.inc();
    }

    /// Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_output_contains_recorded_series() {
        let metrics = Metrics::new().unwrap();
        metrics.observe_request("GET", "/v1/customers", 200, 0.004);
        metrics.invoice_issued(118_000);
        metrics.invoice_voided();

        let text = metrics.render().unwrap();
        assert!(text.contains(
            r#"spadesk_http_requests_total{method="GET",route="/v1/customers",status="200"} 1"#
        ));
        assert!(text.contains("spadesk_invoices_issued_total 1"));
        assert!(text.contains("spadesk_invoice_revenue_minor_total 118000"));
        assert!(text.contains("spadesk_invoices_voided_total 1"));
    }

    #[test]
    fn each_instance_has_its_own_registry() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.invoice_voided();
        assert!(b.render().unwrap().contains("spadesk_invoices_voided_total 0"));
    }
}
