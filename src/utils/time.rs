use chrono::{DateTime, Local, NaiveDate, Utc};

/// Renders seconds as `HH:MM:SS`. Hours are not wrapped, so a day and a half is `36:00:00`.
pub fn format_hms(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let seconds = seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Calendar day a session belongs to. Sessions are attributed to the local day they started on.
pub fn local_date(moment: DateTime<Utc>) -> NaiveDate {
    moment.with_timezone(&Local).date_naive()
}
