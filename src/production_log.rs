//! Server-side production log, split into timestamped records.
//!
//! Records keep file order. Timestamps in the log are not monotonic (workers
//! write concurrently, some with skewed clocks), so range queries always scan
//! every record.
use crate::error::ClaimsError;
use chrono::NaiveDateTime;
use regex::Regex;
use std::cell::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Record header lines start with `2018-06-13T07:37:26 `.
const LOG_DATE_PATTERN: &str = r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2} ";
const LOG_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const LOG_DATE_LEN: usize = 19;

fn log_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(LOG_DATE_PATTERN).expect("valid log date regex"))
}

/// One logical log entry: the header line (timestamp stripped) plus any
/// continuation lines. Lines keep their original line terminators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub time: NaiveDateTime,
    pub lines: Vec<String>,
}

impl LogRecord {
    /// Record text as it appears in the slice handed to rules.
    pub fn text(&self) -> String {
        self.lines.concat()
    }

    /// Record text with its timestamp prefix restored.
    #[cfg(test)]
    pub fn raw_text(&self) -> String {
        format!("{} {}", self.time.format(LOG_DATE_FORMAT), self.text())
    }
}

/// Range query over log records, injected into case records.
pub trait LogAccessor {
    /// Every record with `start <= time <= end`, in file order.
    fn from_to(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<&LogRecord>, ClaimsError>;
}

/// Parsed log: text before the first timestamped line, then the records.
#[derive(Debug, Clone, Default)]
pub struct SegmentedLog {
    pub preamble: Vec<String>,
    pub records: Vec<LogRecord>,
}

impl SegmentedLog {
    pub fn parse(text: &str) -> Self {
        let mut log = SegmentedLog::default();
        let mut current: Option<LogRecord> = None;

        for line in text.split_inclusive('\n') {
            if let Some(time) = header_timestamp(line) {
                if let Some(done) = current.take() {
                    log.records.push(done);
                }
                current = Some(LogRecord {
                    time,
                    lines: vec![line[LOG_DATE_LEN + 1..].to_string()],
                });
                continue;
            }
            match current.as_mut() {
                Some(record) => record.lines.push(line.to_string()),
                None => log.preamble.push(line.to_string()),
            }
        }
        if let Some(done) = current {
            log.records.push(done);
        }
        log
    }

    /// Reassemble the original text from the preamble and every record.
    #[cfg(test)]
    pub fn to_text(&self) -> String {
        let mut out = self.preamble.concat();
        for record in &self.records {
            out.push_str(&record.raw_text());
        }
        out
    }
}

impl LogAccessor for SegmentedLog {
    fn from_to(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<&LogRecord>, ClaimsError> {
        // No early exit: a later record may carry an earlier timestamp.
        Ok(self
            .records
            .iter()
            .filter(|record| start <= record.time && record.time <= end)
            .collect())
    }
}

fn header_timestamp(line: &str) -> Option<NaiveDateTime> {
    if !log_date_regex().is_match(line) {
        return None;
    }
    match NaiveDateTime::parse_from_str(&line[..LOG_DATE_LEN], LOG_DATE_FORMAT) {
        Ok(time) => Some(time),
        Err(err) => {
            tracing::debug!(%err, "timestamp-like log line kept as continuation");
            None
        }
    }
}

/// Decode ISO-8859-1 bytes; every byte is its own code point, so this cannot fail.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| char::from(byte)).collect()
}

/// Produces the log file on disk when it is not cached yet.
pub trait LogFetcher {
    fn fetch(&self, dest: &Path) -> Result<(), ClaimsError>;
}

/// Production log of one build, read from the cache and parsed on first use.
pub struct ProductionLog {
    path: PathBuf,
    fetcher: Option<Box<dyn LogFetcher>>,
    /// Parsed log, or the message of the failure that prevented it.
    state: OnceCell<Result<SegmentedLog, String>>,
}

impl ProductionLog {
    pub fn new(path: PathBuf, fetcher: Option<Box<dyn LogFetcher>>) -> Self {
        Self {
            path,
            fetcher,
            state: OnceCell::new(),
        }
    }

    /// Parsed log. The first failure to fetch or read it is returned as is
    /// and remembered; later calls report it without another attempt.
    pub fn log(&self) -> Result<&SegmentedLog, ClaimsError> {
        if let Some(state) = self.state.get() {
            return self.settled(state);
        }
        match self.load() {
            Ok(parsed) => self.settled(self.state.get_or_init(|| Ok(parsed))),
            Err(err) => {
                tracing::debug!(path = %self.path.display(), %err, "production log unavailable");
                let _ = self.state.set(Err(err.to_string()));
                Err(err)
            }
        }
    }

    fn settled<'a>(
        &self,
        state: &'a Result<SegmentedLog, String>,
    ) -> Result<&'a SegmentedLog, ClaimsError> {
        state.as_ref().map_err(|detail| ClaimsError::LogUnavailable {
            path: self.path.clone(),
            detail: detail.clone(),
        })
    }

    fn load(&self) -> Result<SegmentedLog, ClaimsError> {
        if !self.path.is_file() {
            if let Some(fetcher) = &self.fetcher {
                fetcher.fetch(&self.path)?;
            }
        }
        let bytes = std::fs::read(&self.path).map_err(|source| ClaimsError::LogRead {
            path: self.path.clone(),
            source,
        })?;
        let parsed = SegmentedLog::parse(&decode_latin1(&bytes));
        tracing::debug!(
            path = %self.path.display(),
            records = parsed.records.len(),
            "production log parsed into memory"
        );
        Ok(parsed)
    }
}

impl LogAccessor for ProductionLog {
    fn from_to(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<&LogRecord>, ClaimsError> {
        self.log()?.from_to(start, end)
    }
}

impl std::fmt::Debug for ProductionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductionLog")
            .field("path", &self.path)
            .field("loaded", &self.state.get().map(Result::is_ok))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;

    const SAMPLE: &str = "\
2018-06-17T17:29:44 [I|dyn|] start terminating clock...
2018-06-17T21:34:49 [I|app|] Current user: foreman_admin (administrator)
2018-06-17T21:37:21 [W|app|] Backtrace:
  /usr/share/foreman/app/models/host.rb:12
  /usr/share/foreman/app/models/host.rb:40
2018-06-17T17:41:38 [I|app|] Started POST \"/katello/api/v2/organizations\"
";

    fn ts(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, LOG_DATE_FORMAT).expect("parse fixture timestamp")
    }

    #[test]
    fn groups_continuation_lines_into_records() {
        let log = SegmentedLog::parse(SAMPLE);
        assert!(log.preamble.is_empty());
        assert_eq!(log.records.len(), 4);
        let backtrace = &log.records[2];
        assert_eq!(backtrace.time, ts("2018-06-17T21:37:21"));
        assert_eq!(backtrace.lines.len(), 3);
        assert_eq!(backtrace.lines[0], "[W|app|] Backtrace:\n");
        assert_eq!(backtrace.lines[2], "  /usr/share/foreman/app/models/host.rb:40\n");
    }

    #[test]
    fn reassembles_original_text() {
        let with_preamble = format!("garbage before\n{SAMPLE}no trailing newline");
        let log = SegmentedLog::parse(&with_preamble);
        assert_eq!(log.preamble, vec!["garbage before\n".to_string()]);
        assert_eq!(log.to_text(), with_preamble);
    }

    #[test]
    fn range_query_scans_out_of_order_records() {
        let log = SegmentedLog::parse(SAMPLE);
        let hits = log
            .from_to(ts("2018-06-17T17:00:00"), ts("2018-06-17T18:00:00"))
            .expect("in-memory query");
        let times: Vec<_> = hits.iter().map(|record| record.time).collect();
        // The last record is earlier than the two before it and must still match.
        assert_eq!(
            times,
            vec![ts("2018-06-17T17:29:44"), ts("2018-06-17T17:41:38")]
        );
    }

    #[test]
    fn range_query_bounds_are_inclusive() {
        let log = SegmentedLog::parse(SAMPLE);
        let hits = log
            .from_to(ts("2018-06-17T21:34:49"), ts("2018-06-17T21:37:21"))
            .expect("in-memory query");
        assert_eq!(hits.len(), 2);
        let none = log
            .from_to(ts("2018-06-17T22:00:00"), ts("2018-06-17T23:00:00"))
            .expect("in-memory query");
        assert!(none.is_empty());
    }

    #[test]
    fn invalid_calendar_date_is_a_continuation() {
        let log = SegmentedLog::parse("2018-06-17T17:29:44 ok\n2018-19-99T99:99:99 bogus\n");
        assert_eq!(log.records.len(), 1);
        assert_eq!(log.records[0].lines.len(), 2);
    }

    #[test]
    fn decodes_latin1_bytes() {
        assert_eq!(decode_latin1(b"caf\xe9 \xff"), "caf\u{e9} \u{ff}");
    }

    struct CountingFetcher {
        calls: Cell<usize>,
    }

    impl LogFetcher for CountingFetcher {
        fn fetch(&self, dest: &Path) -> Result<(), ClaimsError> {
            self.calls.set(self.calls.get() + 1);
            std::fs::write(dest, SAMPLE).map_err(|source| ClaimsError::LogRead {
                path: dest.to_path_buf(),
                source,
            })
        }
    }

    #[test]
    fn production_log_reads_cached_file_lazily() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"2018-06-17T17:29:44 caf\xe9\n").expect("write log");
        let log = ProductionLog::new(file.path().to_path_buf(), None);
        let records = &log.log().expect("parse").records;
        assert_eq!(records[0].text(), "caf\u{e9}\n");
    }

    #[test]
    fn production_log_fetches_missing_file_once() {
        let dir = tempfile::tempdir().expect("temp dir");
        let fetcher = std::rc::Rc::new(CountingFetcher {
            calls: Cell::new(0),
        });
        struct Shared(std::rc::Rc<CountingFetcher>);
        impl LogFetcher for Shared {
            fn fetch(&self, dest: &Path) -> Result<(), ClaimsError> {
                self.0.fetch(dest)
            }
        }
        let log = ProductionLog::new(
            dir.path().join("production.log"),
            Some(Box::new(Shared(fetcher.clone()))),
        );
        assert_eq!(log.log().expect("fetch and parse").records.len(), 4);
        assert_eq!(log.log().expect("memoized").records.len(), 4);
        assert_eq!(fetcher.calls.get(), 1);
    }

    struct UnreachableArchive {
        calls: std::rc::Rc<Cell<usize>>,
    }

    impl LogFetcher for UnreachableArchive {
        fn fetch(&self, _dest: &Path) -> Result<(), ClaimsError> {
            self.calls.set(self.calls.get() + 1);
            Err(ClaimsError::Http {
                url: "https://jenkins.example.com/job/x/1/artifact/foreman-debug.tar.xz".to_string(),
                detail: "connection refused".to_string(),
            })
        }
    }

    #[test]
    fn failed_fetch_is_remembered() {
        let dir = tempfile::tempdir().expect("temp dir");
        let calls = std::rc::Rc::new(Cell::new(0));
        let log = ProductionLog::new(
            dir.path().join("production.log"),
            Some(Box::new(UnreachableArchive {
                calls: calls.clone(),
            })),
        );
        let first = log.log().expect_err("fetch fails");
        assert!(matches!(first, ClaimsError::Http { .. }));
        let again = log.log().expect_err("still unavailable");
        assert!(matches!(again, ClaimsError::LogUnavailable { .. }));
        assert!(again.to_string().contains("connection refused"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn unreadable_log_is_a_read_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = ProductionLog::new(dir.path().join("absent.log"), None);
        let err = log.log().expect_err("missing file");
        assert!(matches!(err, ClaimsError::LogRead { .. }));
    }
}
