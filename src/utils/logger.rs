use anyhow::Context;
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct LoggerConfig {
    pub level: String,
    pub file_dir: Option<String>,
    pub file_prefix: Option<String>,
    pub rolling: Option<String>,
    #[serde(default)]
    pub max_files: usize,
}

impl LoggerConfig {
    /// Reads NG_LOG_LEVEL, NG_LOG_FILE_DIR, NG_LOG_FILE_PREFIX and NG_LOG_ROLLING.
    /// Unset variables fall back to stdout logging at `info`.
    pub fn from_env() -> Self {
        let level = std::env::var("NG_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let file_dir = std::env::var("NG_LOG_FILE_DIR").ok();
        let file_prefix = std::env::var("NG_LOG_FILE_PREFIX").ok();
        let rolling = std::env::var("NG_LOG_ROLLING").ok();

        Self {
            level,
            file_dir,
            file_prefix,
            rolling,
            max_files: 2,
        }
    }

    /// Installs the global subscriber. The returned guard must be kept alive
    /// for as long as file logging should keep flushing.
    pub fn init(&self) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
        let level = Level::from_str(&self.level).unwrap_or(Level::INFO);

        if let Some(dir_str) = self.file_dir.as_deref() {
            let prefix = self.file_prefix.as_deref().unwrap_or("ngraph");

            let rotation = match self.rolling.as_deref() {
                Some("hourly") => Rotation::HOURLY,
                Some("minutely") => Rotation::MINUTELY,
                Some("never") => Rotation::NEVER,
                _ => Rotation::DAILY,
            };

            let appender: RollingFileAppender = RollingFileAppender::builder()
                .rotation(rotation)
                .max_log_files(self.max_files.max(1))
                .filename_prefix(prefix)
                .build(dir_str)
                .with_context(|| format!("failed to create rolling appender in {}", dir_str))?;

            let (nb, guard) = tracing_appender::non_blocking(appender);

            let _ = tracing_subscriber::fmt()
                .with_max_level(level)
                .with_thread_names(true)
                .with_writer(nb)
                .try_init();

            tracing::info!(
                "logging to dir: {}, prefix: {}, rotation: {:?}",
                dir_str,
                prefix,
                self.rolling
            );
            Ok(Some(guard))
        } else {
            let _ = tracing_subscriber::fmt()
                .with_max_level(level)
                .with_thread_names(true)
                .try_init();
            Ok(None)
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_dir: None,
            file_prefix: None,
            rolling: Some("daily".to_string()),
            max_files: 2,
        }
    }
}

/// Rate limiter for a single logging call site.
///
/// Messages inside `interval` of the last emitted one are counted instead of
/// written; the next emitted message reports how many were suppressed.
/// Usage:
///   warn_throttled!(std::time::Duration::from_secs(5), "dropping data on {}", hook);
pub struct Throttle {
    last: Mutex<Instant>,
    suppressed: AtomicU64,
    interval: Duration,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        // start in the past so the first message is emitted
        let start = Instant::now()
            .checked_sub(interval)
            .unwrap_or_else(Instant::now);
        Self {
            last: Mutex::new(start),
            suppressed: AtomicU64::new(0),
            interval,
        }
    }

    /// `Some(suppressed)` when the caller should emit, `None` when throttled.
    #[inline]
    pub fn poll(&self) -> Option<u64> {
        if !self.interval.is_zero()
            && let Some(last) = self.last.try_lock()
            && last.elapsed() < self.interval
        {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        // contended or due: decide under the lock
        let mut last = self.last.lock();
        if last.elapsed() >= self.interval {
            *last = Instant::now();
            Some(self.suppressed.swap(0, Ordering::Relaxed))
        } else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            None
        }
    }
}

/// Level is given as an identifier (`error`, `warn`, `info`, `debug`, `trace`).
#[macro_export]
macro_rules! log_throttled {
    ($level:ident, $interval:expr, $($arg:tt)*) => {{
        // one throttle per call site
        static _THROTTLE: std::sync::OnceLock<$crate::Throttle> = std::sync::OnceLock::new();
        let t = _THROTTLE.get_or_init(|| $crate::Throttle::new($interval));
        if let Some(_suppressed) = t.poll() {
            if _suppressed > 0 {
                tracing::$level!(suppressed = _suppressed, $($arg)*);
            } else {
                tracing::$level!($($arg)*);
            }
        }
    }};
}

#[macro_export]
macro_rules! error_throttled { ($interval:expr, $($arg:tt)*) => { $crate::log_throttled!(error, $interval, $($arg)*); } }
#[macro_export]
macro_rules! warn_throttled  { ($interval:expr, $($arg:tt)*) => { $crate::log_throttled!(warn,  $interval, $($arg)*); } }
#[macro_export]
macro_rules! debug_throttled { ($interval:expr, $($arg:tt)*) => { $crate::log_throttled!(debug, $interval, $($arg)*); } }

#[cfg(test)]
mod tests {
    use super::{LoggerConfig, Throttle};
    use std::time::Duration;

    #[test]
    fn stdout_logging_needs_no_guard() {
        let cfg = LoggerConfig {
            level: "not-a-level".into(),
            ..LoggerConfig::default()
        };
        assert!(cfg.init().unwrap().is_none());
        crate::debug_throttled!(Duration::from_secs(1), "[Logger] test line {}", 1);
    }

    #[test]
    fn throttle_counts_suppressed_messages() {
        let t = Throttle::new(Duration::from_secs(3600));
        assert_eq!(t.poll(), Some(0));
        assert_eq!(t.poll(), None);
        assert_eq!(t.poll(), None);

        let t = Throttle::new(Duration::ZERO);
        assert_eq!(t.poll(), Some(0));
        assert_eq!(t.poll(), Some(0));
    }

    #[test]
    fn due_message_survives_lock_contention() {
        let t = std::sync::Arc::new(Throttle::new(Duration::from_millis(20)));
        assert_eq!(t.poll(), Some(0));
        std::thread::sleep(Duration::from_millis(30));

        let held = t.last.lock();
        let t2 = t.clone();
        let poller = std::thread::spawn(move || t2.poll());
        std::thread::sleep(Duration::from_millis(20));
        drop(held);

        assert_eq!(poller.join().unwrap(), Some(0));
    }
}
