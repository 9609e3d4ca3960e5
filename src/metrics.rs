use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

pub const REQUESTS: MetricDef = MetricDef {
    name: "ctv_vast.requests",
    metric_type: MetricType::Counter,
    description: "CTV VAST requests. Tagged with status, pub_id.",
};

pub const REQUEST_TIME: MetricDef = MetricDef {
    name: "ctv_vast.request_time",
    metric_type: MetricType::Histogram,
    description: "CTV VAST request duration in seconds. Tagged with status, pub_id.",
};

pub const ALL_METRICS: &[MetricDef] = &[REQUESTS, REQUEST_TIME];

/// Publisher label used before the request names one
pub const PUBLISHER_UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestStatus {
    #[default]
    Ok,
    BadInput,
    Err,
}

impl RequestStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Ok => "ok",
            RequestStatus::BadInput => "badinput",
            RequestStatus::Err => "err",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    pub status: RequestStatus,
    pub pub_id: String,
}

impl Default for Labels {
    fn default() -> Self {
        Labels {
            status: RequestStatus::Ok,
            pub_id: PUBLISHER_UNKNOWN.to_string(),
        }
    }
}

pub trait MetricsEngine: Send + Sync {
    fn record_request(&self, labels: &Labels);
    fn record_request_time(&self, labels: &Labels, elapsed: Duration);
}

/// Reports through the `metrics` facade to whatever recorder is installed
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsMetrics;

impl MetricsEngine for StatsMetrics {
    fn record_request(&self, labels: &Labels) {
        ::metrics::counter!(
            REQUESTS.name,
            "status" => labels.status.as_str(),
            "pub_id" => labels.pub_id.clone()
        )
        .increment(1);
    }

    fn record_request_time(&self, labels: &Labels, elapsed: Duration) {
        ::metrics::histogram!(
            REQUEST_TIME.name,
            "status" => labels.status.as_str(),
            "pub_id" => labels.pub_id.clone()
        )
        .record(elapsed.as_secs_f64());
    }
}

/// Records request count and latency when dropped
///
/// Every exit path of a handler drops the timer exactly once, so both
/// measurements are taken once per request.
pub struct RequestTimer {
    engine: Arc<dyn MetricsEngine>,
    start: Instant,
    pub labels: Labels,
}

impl RequestTimer {
    pub fn start(engine: Arc<dyn MetricsEngine>) -> Self {
        RequestTimer {
            engine,
            start: Instant::now(),
            labels: Labels::default(),
        }
    }

    pub fn started_at(&self) -> Instant {
        self.start
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.engine.record_request(&self.labels);
        self.engine
            .record_request_time(&self.labels, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorded {
        requests: Mutex<Vec<Labels>>,
        times: Mutex<Vec<Labels>>,
    }

    impl MetricsEngine for Recorded {
        fn record_request(&self, labels: &Labels) {
            self.requests.lock().unwrap().push(labels.clone());
        }

        fn record_request_time(&self, labels: &Labels, _elapsed: Duration) {
            self.times.lock().unwrap().push(labels.clone());
        }
    }

    #[test]
    fn timer_records_once_on_drop() {
        let engine = Arc::new(Recorded::default());
        {
            let mut timer = RequestTimer::start(engine.clone());
            timer.labels.status = RequestStatus::BadInput;
            timer.labels.pub_id = "pub-1".to_string();
        }

        let requests = engine.requests.lock().unwrap();
        let times = engine.times.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(times.len(), 1);
        assert_eq!(requests[0].status, RequestStatus::BadInput);
        assert_eq!(requests[0].pub_id, "pub-1");
    }

    #[test]
    fn default_labels() {
        let labels = Labels::default();
        assert_eq!(labels.status.as_str(), "ok");
        assert_eq!(labels.pub_id, PUBLISHER_UNKNOWN);
    }

    #[test]
    fn stats_metrics_without_recorder_is_a_noop() {
        let labels = Labels::default();
        StatsMetrics.record_request(&labels);
        StatsMetrics.record_request_time(&labels, Duration::from_millis(5));
        assert_eq!(ALL_METRICS.len(), 2);
    }
}
