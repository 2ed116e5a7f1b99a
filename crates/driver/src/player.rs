//! Player thread.
//!
//! [`Player::spawn`] moves a [`SoundDriver`] onto its own thread. The thread
//! owns the driver and everything below it; other threads talk to it through
//! a [`PlayerHandle`]: commands go through a bounded channel, state comes back
//! as a [`PlayerSnapshot`] behind a mutex that is only held to copy it.
//! Stopping is cooperative: the halt flag is checked once per tick and by
//! sinks while they wait for room.

use crate::driver::{DriverCommand, PlayerSnapshot, SoundDriver};
use crate::error::DriverError;
use fami_core::logging::{log, LogCategory, LogLevel};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Commands that can wait in the queue before `send` blocks
pub const COMMAND_QUEUE_DEPTH: usize = 64;

/// How long a sink waits for room before looking at the halt flag again
pub const SINK_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Where the player thread puts its audio
pub trait AudioSink: Send + 'static {
    /// Take one tick of samples; returning `false` ends playback.
    /// A sink that waits must give up once `halt` is set.
    fn write(&mut self, samples: &[i16], halt: &AtomicBool) -> bool;
}

/// Feeds a bounded sample channel, as read by an audio callback. A full
/// channel holds the player back, which paces it to the audio device.
impl AudioSink for SyncSender<i16> {
    fn write(&mut self, samples: &[i16], halt: &AtomicBool) -> bool {
        for &sample in samples {
            let mut sample = sample;
            loop {
                match self.try_send(sample) {
                    Ok(()) => break,
                    Err(TrySendError::Full(rejected)) => {
                        if halt.load(Ordering::Acquire) {
                            return false;
                        }
                        sample = rejected;
                        thread::sleep(SINK_POLL_INTERVAL);
                    }
                    Err(TrySendError::Disconnected(_)) => return false,
                }
            }
        }
        true
    }
}

/// Drops the audio, for running the driver without an output device
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn write(&mut self, _samples: &[i16], _halt: &AtomicBool) -> bool {
        true
    }
}

pub struct Player;

impl Player {
    pub fn spawn(driver: SoundDriver, sink: impl AudioSink) -> Result<PlayerHandle, DriverError> {
        let (commands, receiver) = sync_channel(COMMAND_QUEUE_DEPTH);
        let snapshot = Arc::new(Mutex::new(driver.snapshot()));
        let halt = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            driver,
            sink,
            commands: receiver,
            snapshot: Arc::clone(&snapshot),
            halt: Arc::clone(&halt),
        };
        let thread = thread::Builder::new()
            .name("fami-player".into())
            .spawn(move || worker.run())?;

        Ok(PlayerHandle {
            commands,
            snapshot,
            halt,
            thread: Some(thread),
        })
    }
}

struct Worker<S> {
    driver: SoundDriver,
    sink: S,
    commands: Receiver<DriverCommand>,
    snapshot: Arc<Mutex<PlayerSnapshot>>,
    halt: Arc<AtomicBool>,
}

impl<S: AudioSink> Worker<S> {
    fn run(mut self) -> SoundDriver {
        log(LogCategory::Player, LogLevel::Info, || "player thread started".to_string());
        while !self.halt.load(Ordering::Acquire) {
            if !self.drain_commands() {
                break;
            }
            let samples = self.driver.tick();
            let snapshot = self.driver.snapshot();
            *lock(&self.snapshot) = snapshot;
            if !self.sink.write(&samples, &self.halt) {
                if !self.halt.load(Ordering::Acquire) {
                    log(LogCategory::Player, LogLevel::Info, || "audio sink closed".to_string());
                }
                break;
            }
        }
        self.driver.stop();
        *lock(&self.snapshot) = self.driver.snapshot();
        log(LogCategory::Player, LogLevel::Info, || "player thread stopped".to_string());
        self.driver
    }

    /// Apply queued commands; `false` once every handle is gone
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    if let Err(e) = self.driver.handle_command(command) {
                        log(LogCategory::Player, LogLevel::Warn, || format!("command failed: {e}"));
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }
}

/// A poisoned lock still holds a whole snapshot
fn lock(snapshot: &Mutex<PlayerSnapshot>) -> MutexGuard<'_, PlayerSnapshot> {
    snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Control side of a running player
pub struct PlayerHandle {
    commands: SyncSender<DriverCommand>,
    snapshot: Arc<Mutex<PlayerSnapshot>>,
    halt: Arc<AtomicBool>,
    thread: Option<JoinHandle<SoundDriver>>,
}

impl PlayerHandle {
    /// Queue a command; blocks while the queue is full
    pub fn send(&self, command: DriverCommand) -> Result<(), DriverError> {
        self.commands
            .send(command)
            .map_err(|_| DriverError::PlayerStopped)
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        lock(&self.snapshot).clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ask the thread to stop and wait for it; the driver is handed back
    pub fn join(mut self) -> Result<SoundDriver, DriverError> {
        self.halt.store(true, Ordering::Release);
        let thread = self.thread.take().ok_or(DriverError::PlayerStopped)?;
        thread.join().map_err(|_| DriverError::PlayerStopped)
    }
}

impl Drop for PlayerHandle {
    fn drop(&mut self) {
        self.halt.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log(LogCategory::Player, LogLevel::Error, || "player thread panicked".to_string());
            }
        }
    }
}
