//! Execution bounds of a single test case, recovered from its captured output.
use crate::error::ClaimsError;
use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::OnceLock;

/// Captured output lines look like `2018-06-13 07:37:26 - message`.
const STDOUT_DATE_PATTERN: &str =
    r"^([0-9]{4}-[01][0-9]-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}) -";
const STDOUT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// First and last timestamps found in a case's captured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

fn stdout_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(STDOUT_DATE_PATTERN).expect("valid stdout date regex"))
}

fn line_timestamp(line: &str) -> Option<NaiveDateTime> {
    let captures = stdout_date_regex().captures(line)?;
    NaiveDateTime::parse_from_str(&captures[1], STDOUT_DATE_FORMAT).ok()
}

/// Scan forward for the first timestamped line and backward for the last one.
///
/// Returns `Ok(None)` when the output carries no timestamp at all. The two
/// scans must not cross: lines skipped from the front plus lines skipped from
/// the back can never exceed the number of lines.
pub fn extract_timings(stdout: &str) -> Result<Option<Timings>, ClaimsError> {
    let lines: Vec<&str> = stdout.split('\n').collect();

    let Some((head_skipped, start)) = lines
        .iter()
        .enumerate()
        .find_map(|(idx, line)| line_timestamp(line).map(|ts| (idx, ts)))
    else {
        return Ok(None);
    };
    let Some((tail_skipped, end)) = lines
        .iter()
        .rev()
        .enumerate()
        .find_map(|(idx, line)| line_timestamp(line).map(|ts| (idx, ts)))
    else {
        return Ok(None);
    };

    // Both scans land on a line, so each consumes one more than it skipped.
    let used = head_skipped + tail_skipped + 1;
    if used > lines.len() {
        return Err(ClaimsError::Timing {
            reason: format!(
                "start scan skipped {head_skipped} and end scan skipped {tail_skipped} of {} lines",
                lines.len()
            ),
        });
    }
    Ok(Some(Timings { start, end }))
}
