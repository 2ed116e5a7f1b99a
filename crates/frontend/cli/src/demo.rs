//! Built-in song played when no file is given.

use fami_core::{ChannelId, ChipKind};
use fami_driver::document::note_from_name;
use fami_driver::{ChannelNote, Document, EffectCommand, Instrument, Note, Sequence, SequenceKind};

const ROWS: usize = 16;

const LEAD: u8 = 0;
const HAT: u8 = 1;
const PAD: u8 = 2;

fn note(name: &str) -> ChannelNote {
    note_from_name(name).map_or(ChannelNote::EMPTY, ChannelNote::play)
}

fn column(doc: &Document, channel: ChannelId) -> usize {
    doc.channels()
        .iter()
        .position(|&c| c == channel)
        .unwrap_or_default()
}

fn write(doc: &mut Document, frame: usize, channel: ChannelId, cells: &[(usize, ChannelNote)]) {
    let col = column(doc, channel);
    for (row, cell) in cells {
        doc.set_note(frame, col, *row, *cell);
    }
}

pub fn song() -> Document {
    let mut doc = Document::new(&[ChipKind::Vrc6]);
    doc.title = "famiplay demo".to_string();
    doc.pattern_length = ROWS;
    doc.speed = 6;
    doc.tempo = 150;
    let channels = doc.channels().len();
    doc.frames = vec![vec![0; channels], vec![1; channels]];

    doc.instruments.insert(
        LEAD,
        Instrument::standard("lead")
            .with_sequence(
                SequenceKind::Volume,
                Sequence::new(&[15, 13, 11, 10, 9, 8]).with_release(5),
            )
            .with_sequence(SequenceKind::Duty, Sequence::new(&[2])),
    );
    doc.instruments.insert(
        HAT,
        Instrument::standard("hat")
            .with_sequence(SequenceKind::Volume, Sequence::new(&[12, 6, 2, 0])),
    );
    doc.instruments.insert(
        PAD,
        Instrument::standard("pad")
            .with_sequence(SequenceKind::Volume, Sequence::new(&[4, 6, 8, 10])),
    );

    let lead = |name: &str| note(name).with_instrument(LEAD);
    write(
        &mut doc,
        0,
        ChannelId::Square1,
        &[
            (0, lead("C-4")),
            (2, lead("E-4")),
            (4, lead("G-4")),
            (6, lead("E-4")),
            (8, lead("A-4").with_effect(EffectCommand::Vibrato, 0x34)),
            (12, lead("G-4")),
            (14, ChannelNote::EMPTY.with_note(Note::Release)),
        ],
    );
    write(
        &mut doc,
        1,
        ChannelId::Square1,
        &[
            (0, lead("F-4")),
            (4, lead("A-4").with_effect(EffectCommand::Portamento, 0x08)),
            (8, lead("G-4").with_effect(EffectCommand::Arpeggio, 0x47)),
            (12, lead("C-5").with_effect(EffectCommand::Portamento, 0x00)),
            (15, ChannelNote::EMPTY.with_note(Note::Halt)),
        ],
    );

    write(
        &mut doc,
        0,
        ChannelId::Square2,
        &[
            (0, lead("E-3").with_volume(8)),
            (8, lead("F-3").with_volume(8)),
        ],
    );
    write(
        &mut doc,
        1,
        ChannelId::Square2,
        &[
            (0, lead("A-3").with_volume(8)),
            (8, lead("B-3").with_volume(8)),
        ],
    );

    let bass = [("C-3", "G-2"), ("F-2", "G-2")];
    for (frame, (first, second)) in bass.into_iter().enumerate() {
        write(
            &mut doc,
            frame,
            ChannelId::Triangle,
            &[
                (0, note(first)),
                (6, ChannelNote::EMPTY.with_note(Note::Halt)),
                (8, note(second)),
                (14, ChannelNote::EMPTY.with_note(Note::Halt)),
            ],
        );
    }

    for frame in 0..2 {
        let hats: Vec<(usize, ChannelNote)> = (0..ROWS)
            .step_by(2)
            .map(|row| {
                let pitch = if row % 4 == 0 { "C#5" } else { "F-5" };
                (row, note(pitch).with_instrument(HAT))
            })
            .collect();
        write(&mut doc, frame, ChannelId::Noise, &hats);
    }

    write(
        &mut doc,
        0,
        ChannelId::Vrc6Sawtooth,
        &[(0, note("C-3").with_instrument(PAD).with_volume(12))],
    );
    write(
        &mut doc,
        1,
        ChannelId::Vrc6Sawtooth,
        &[
            (0, note("F-2").with_instrument(PAD).with_volume(12)),
            (8, note("G-2").with_instrument(PAD).with_volume(12)),
        ],
    );
    write(
        &mut doc,
        1,
        ChannelId::Vrc6Pulse1,
        &[
            (0, note("C-5").with_volume(6)),
            (2, note("A-4").with_volume(5)),
            (4, note("F-4").with_volume(4)),
            (6, ChannelNote::EMPTY.with_note(Note::Halt)),
        ],
    );

    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_song_is_valid() {
        let doc = song();
        doc.validate().unwrap();
        assert_eq!(doc.frame_count(), 2);
        let square = column(&doc, ChannelId::Square1);
        assert_ne!(doc.note(0, square, 0), doc.note(1, square, 0));
    }
}
