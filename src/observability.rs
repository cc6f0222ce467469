use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("coastie.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("coastie.client.request_errors");
pub(crate) static CLIENT_RAW_REPLY_FALLBACKS: Counter =
    Counter::new("coastie.client.raw_reply_fallbacks");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("coastie.client.request_duration_seconds");

pub(crate) static HISTORY_INSERTS: Counter = Counter::new("coastie.history.inserts");
pub(crate) static HISTORY_TRIMMED_ROWS: Counter = Counter::new("coastie.history.trimmed_rows");
pub(crate) static HISTORY_STORAGE_ERRORS: Counter =
    Counter::new("coastie.history.storage_errors");

pub(crate) static SESSION_SENDS: Counter = Counter::new("coastie.session.sends");
pub(crate) static SESSION_CANCELLED: Counter = Counter::new("coastie.session.cancelled");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_RAW_REPLY_FALLBACKS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&HISTORY_INSERTS);
    collector.register_counter(&HISTORY_TRIMMED_ROWS);
    collector.register_counter(&HISTORY_STORAGE_ERRORS);

    collector.register_counter(&SESSION_SENDS);
    collector.register_counter(&SESSION_CANCELLED);
}
