//! Category and level based logging for the sound engine.
//!
//! Emulation code never talks to a logging backend directly. Every message goes
//! through [`log()`], which checks a per-category level, applies a sliding-window
//! rate limit, and only then evaluates the message closure and forwards it to the
//! [`log`](https://docs.rs/log) facade under the target `fami::<category>`.
//! Frontends pick the backend (the CLI installs `env_logger`).
//!
//! # Usage
//!
//! ```rust
//! use fami_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Apu, LogLevel::Debug, || {
//!     format!("unmapped write ${:04X} = ${:02X}", 0x4018, 0x00)
//! });
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }

    /// The matching `log` crate level, `None` for `Off`.
    pub fn as_log_level(self) -> Option<log::Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(log::Level::Error),
            LogLevel::Warn => Some(log::Level::Warn),
            LogLevel::Info => Some(log::Level::Info),
            LogLevel::Debug => Some(log::Level::Debug),
            LogLevel::Trace => Some(log::Level::Trace),
        }
    }
}

/// Log category for the engine's subsystems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Chip models (register decoding, sample memory)
    Chip,
    /// Band-limited mixer and output filters
    Mixer,
    /// APU dispatcher (routing, frame timing)
    Apu,
    /// Sound driver (rows, effects, channel handlers)
    Driver,
    /// Player thread and command queue
    Player,
    /// Unimplemented or ignored features
    Stubs,
}

const CATEGORY_COUNT: usize = 6;

impl LogCategory {
    pub const ALL: [LogCategory; CATEGORY_COUNT] = [
        LogCategory::Chip,
        LogCategory::Mixer,
        LogCategory::Apu,
        LogCategory::Driver,
        LogCategory::Player,
        LogCategory::Stubs,
    ];

    fn index(self) -> usize {
        match self {
            LogCategory::Chip => 0,
            LogCategory::Mixer => 1,
            LogCategory::Apu => 2,
            LogCategory::Driver => 3,
            LogCategory::Player => 4,
            LogCategory::Stubs => 5,
        }
    }

    /// Target string handed to the `log` facade
    pub fn target(self) -> &'static str {
        match self {
            LogCategory::Chip => "fami::chip",
            LogCategory::Mixer => "fami::mixer",
            LogCategory::Apu => "fami::apu",
            LogCategory::Driver => "fami::driver",
            LogCategory::Player => "fami::player",
            LogCategory::Stubs => "fami::stubs",
        }
    }

    /// Parse a category name as used on the command line
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "chip" | "chips" => Some(LogCategory::Chip),
            "mixer" => Some(LogCategory::Mixer),
            "apu" => Some(LogCategory::Apu),
            "driver" => Some(LogCategory::Driver),
            "player" => Some(LogCategory::Player),
            "stubs" | "stub" => Some(LogCategory::Stubs),
            _ => None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sliding one-second window per category.
struct RateLimiter {
    max_per_second: AtomicUsize,
    window: Duration,
    timestamps: Mutex<[VecDeque<Instant>; CATEGORY_COUNT]>,
    dropped: Mutex<[usize; CATEGORY_COUNT]>,
}

impl RateLimiter {
    fn new(max_per_second: usize) -> Self {
        Self {
            max_per_second: AtomicUsize::new(max_per_second),
            window: Duration::from_secs(1),
            timestamps: Mutex::new(std::array::from_fn(|_| VecDeque::new())),
            dropped: Mutex::new([0; CATEGORY_COUNT]),
        }
    }

    /// Returns whether the message may pass, plus the number of messages
    /// dropped since the last one that passed.
    fn should_allow(&self, category: LogCategory, now: Instant) -> (bool, usize) {
        let idx = category.index();
        let mut timestamps = lock(&self.timestamps);
        let mut dropped = lock(&self.dropped);

        let window = &mut timestamps[idx];
        while let Some(&front) = window.front() {
            if now.duration_since(front) > self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() < self.max_per_second.load(Ordering::Relaxed) {
            window.push_back(now);
            let count = std::mem::take(&mut dropped[idx]);
            (true, count)
        } else {
            dropped[idx] += 1;
            (false, 0)
        }
    }

    fn clear(&self) {
        lock(&self.timestamps).iter_mut().for_each(VecDeque::clear);
        *lock(&self.dropped) = [0; CATEGORY_COUNT];
    }
}

/// Global logging configuration
pub struct LogConfig {
    /// Fallback level for categories left at `Off`
    global_level: AtomicU8,
    levels: [AtomicU8; CATEGORY_COUNT],
    rate_limiter: RateLimiter,
}

impl LogConfig {
    /// All logging disabled, 60 messages per second per category
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            levels: std::array::from_fn(|_| AtomicU8::new(LogLevel::Off as u8)),
            rate_limiter: RateLimiter::new(60),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.levels[category.index()].load(Ordering::Relaxed))
    }

    /// A category level other than `Off` wins; otherwise the global level decides.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        if level == LogLevel::Off {
            return false;
        }
        let category_level = self.level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.global_level()
        }
    }

    /// Reset all levels to `Off` and forget rate limiter history
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
        self.rate_limiter.clear();
    }

    pub fn set_rate_limit(&self, max_per_second: usize) {
        self.rate_limiter
            .max_per_second
            .store(max_per_second, Ordering::Relaxed);
    }

    pub fn rate_limit(&self) -> usize {
        self.rate_limiter.max_per_second.load(Ordering::Relaxed)
    }
}

/// Log a lazily formatted message under a category.
///
/// The closure only runs when the category accepts the level and the rate
/// limiter has room. When messages were dropped, a warning with the count is
/// emitted ahead of the next message that passes.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }
    let Some(log_level) = level.as_log_level() else {
        return;
    };

    let (allowed, dropped) = config.rate_limiter.should_allow(category, Instant::now());
    if !allowed {
        return;
    }
    if dropped > 0 {
        log::log!(
            target: category.target(),
            log::Level::Warn,
            "rate limit exceeded, {} message(s) dropped",
            dropped
        );
    }
    log::log!(target: category.target(), log_level, "{}", message_fn());
}
