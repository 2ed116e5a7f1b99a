//! Live output through the default audio device.

use anyhow::{Context, Result};
use fami_driver::{Player, PlayerHandle, SoundDriver};
use rodio::{OutputStream, Source};
use std::sync::mpsc::{sync_channel, Receiver};
use std::time::Duration;

struct StreamSource {
    rx: Receiver<i16>,
    channels: u16,
    sample_rate: u32,
}

impl Iterator for StreamSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        // underruns play silence
        let s = self.rx.try_recv().unwrap_or(0);
        Some(s as f32 / 32768.0)
    }
}

impl Source for StreamSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Play until `until` returns false, then hand the driver back
pub fn play(
    driver: SoundDriver,
    sample_rate: u32,
    channels: u8,
    mut until: impl FnMut(&PlayerHandle) -> bool,
) -> Result<SoundDriver> {
    let (_stream, stream_handle) =
        OutputStream::try_default().context("failed to open the audio device")?;
    // about a quarter second of buffered audio
    let (audio_tx, audio_rx) = sync_channel::<i16>((sample_rate * channels as u32 / 4) as usize);
    stream_handle
        .play_raw(
            StreamSource {
                rx: audio_rx,
                channels: channels as u16,
                sample_rate,
            }
            .convert_samples(),
        )
        .context("failed to start audio playback")?;

    let handle = Player::spawn(driver, audio_tx)?;
    while handle.is_running() && until(&handle) {
        std::thread::sleep(Duration::from_millis(20));
    }
    Ok(handle.join()?)
}
