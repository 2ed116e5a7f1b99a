//! Core log categories reach the `log` facade with their own targets.

use fami_core::logging::{LogCategory, LogConfig, LogLevel};
use fami_core::{Apu, ChipKind, ChipSet, EngineConfig};
use log::{Log, Metadata, Record};
use std::sync::{Mutex, MutexGuard, Once};

struct Capture;

static RECORDS: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());
static LOGGER: Capture = Capture;
static INSTALL: Once = Once::new();
/// Tests share the global config
static SERIAL: Mutex<()> = Mutex::new(());

impl Log for Capture {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDS
            .lock()
            .unwrap()
            .push((record.target().to_string(), record.args().to_string()));
    }

    fn flush(&self) {}
}

fn setup() -> MutexGuard<'static, ()> {
    let guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    INSTALL.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(log::LevelFilter::Trace);
    });
    LogConfig::global().reset();
    RECORDS.lock().unwrap().clear();
    guard
}

fn messages(target: &str) -> Vec<String> {
    RECORDS
        .lock()
        .unwrap()
        .iter()
        .filter(|(t, _)| t == target)
        .map(|(_, m)| m.clone())
        .collect()
}

#[test]
fn unmapped_writes_are_logged_as_stubs() {
    let _guard = setup();
    LogConfig::global().set_level(LogCategory::Stubs, LogLevel::Trace);

    let mut apu = Apu::new(&EngineConfig::default()).unwrap();
    // VRC6 is not enabled
    apu.write(0x9000, 0x3F);
    let stubs = messages("fami::stubs");
    assert!(stubs.iter().any(|m| m.contains("$9000")), "{stubs:?}");
}

#[test]
fn categories_left_off_stay_quiet() {
    let _guard = setup();
    LogConfig::global().set_level(LogCategory::Stubs, LogLevel::Warn);

    let mut apu = Apu::new(&EngineConfig::default()).unwrap();
    apu.set_chips(ChipSet::base().with(ChipKind::Vrc6));
    apu.write(0x9000, 0x3F);
    assert!(messages("fami::stubs").is_empty());
    assert!(messages("fami::apu").is_empty());
}

#[test]
fn global_level_covers_every_category() {
    let _guard = setup();
    LogConfig::global().set_global_level(LogLevel::Debug);

    let mut apu = Apu::new(&EngineConfig::default()).unwrap();
    apu.set_chips(ChipSet::base().with(ChipKind::Fds));
    let apu_messages = messages("fami::apu");
    assert!(
        apu_messages.iter().any(|m| m.contains("FDS")),
        "{apu_messages:?}"
    );
}
