use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("chatfolio.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("chatfolio.client.request_errors");
pub(crate) static CLIENT_REQUEST_RETRIES: Counter = Counter::new("chatfolio.client.retries");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("chatfolio.client.request_duration_seconds");
pub(crate) static CLIENT_RETRY_BACKOFF: Moments =
    Moments::new("chatfolio.client.retry_backoff_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("chatfolio.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("chatfolio.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("chatfolio.stream.bytes");
pub(crate) static STREAM_TTFB: Moments = Moments::new("chatfolio.stream.ttfb_seconds");
pub(crate) static STREAM_DURATION: Moments = Moments::new("chatfolio.stream.duration_seconds");

pub(crate) static CONTROLLER_SENDS: Counter = Counter::new("chatfolio.controller.sends");
pub(crate) static CONTROLLER_FAILURES: Counter = Counter::new("chatfolio.controller.failures");
pub(crate) static CONTROLLER_CANCELLATIONS: Counter =
    Counter::new("chatfolio.controller.cancellations");
pub(crate) static CONTROLLER_STALE_UPDATES: Counter =
    Counter::new("chatfolio.controller.stale_updates");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_REQUEST_RETRIES);
    collector.register_moments(&CLIENT_REQUEST_DURATION);
    collector.register_moments(&CLIENT_RETRY_BACKOFF);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_TTFB);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&CONTROLLER_SENDS);
    collector.register_counter(&CONTROLLER_FAILURES);
    collector.register_counter(&CONTROLLER_CANCELLATIONS);
    collector.register_counter(&CONTROLLER_STALE_UPDATES);
}
