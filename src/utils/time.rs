use time::OffsetDateTime;
use time::macros::format_description;

/// Milliseconds since the Unix epoch, as stored in `createdAtEpochMs`.
pub fn now_epoch_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Render an epoch-millisecond timestamp like `Mar 4, 9:07 PM` (UTC).
///
/// Timestamps outside the representable range render as the raw number.
pub fn format_epoch_ms(epoch_ms: i64) -> String {
    let format = format_description!(
        "[month repr:short] [day padding:none], [hour repr:12 padding:none]:[minute] [period]"
    );
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(epoch_ms) * 1_000_000)
        .ok()
        .and_then(|dt| dt.format(&format).ok())
        .unwrap_or_else(|| epoch_ms.to_string())
}
