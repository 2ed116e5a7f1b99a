use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fami_core::{Apu, ChipKind, EngineConfig};

fn apu_with(chips: &[ChipKind]) -> Apu {
    let config = EngineConfig {
        chips: chips.to_vec(),
        ..Default::default()
    };
    let mut apu = Apu::new(&config).unwrap();

    // Square, triangle and noise held on
    apu.write(0x4015, 0x0F);
    apu.write(0x4000, 0xBF);
    apu.write(0x4002, 0xAB);
    apu.write(0x4003, 0x01);
    apu.write(0x4008, 0xFF);
    apu.write(0x400A, 0x80);
    apu.write(0x400B, 0x01);
    apu.write(0x400C, 0x3F);
    apu.write(0x400E, 0x04);
    apu.write(0x400F, 0x01);
    apu
}

fn key_expansions(apu: &mut Apu) {
    // VRC6 pulse and saw
    apu.write(0x9000, 0x7F);
    apu.write(0x9001, 0x00);
    apu.write(0x9002, 0x81);
    apu.write(0xB000, 0x20);
    apu.write(0xB001, 0x00);
    apu.write(0xB002, 0x82);
    // N163, four channels, one audible
    apu.write(0xF800, 0xF8);
    for value in [0x00, 0x00, 0x10, 0x00, 0xF0, 0x00, 0x00, 0x3F] {
        apu.write(0x4800, value);
    }
    // S5B tone A
    for (reg, value) in [(0x00, 0xFE), (0x01, 0x00), (0x07, 0x3E), (0x08, 0x0F)] {
        apu.write(0xC000, reg);
        apu.write(0xE000, value);
    }
    // VRC7 channel 1, patch 1
    for (reg, value) in [(0x10, 0x22), (0x30, 0x10), (0x20, 0x18)] {
        apu.write(0x9010, reg);
        apu.write(0x9030, value);
    }
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("apu_frame");

    group.bench_function("2a03", |b| {
        let mut apu = apu_with(&[]);
        let frame = apu.frame_length();
        b.iter(|| {
            apu.add_time(frame);
            apu.process();
            black_box(apu.take_samples());
        });
    });

    group.bench_function("expansions", |b| {
        let mut apu = apu_with(&[ChipKind::Vrc6, ChipKind::Vrc7, ChipKind::N163, ChipKind::S5b]);
        key_expansions(&mut apu);
        let frame = apu.frame_length();
        b.iter(|| {
            apu.add_time(frame);
            apu.process();
            black_box(apu.take_samples());
        });
    });

    group.finish();
}

fn bench_write_granularity(c: &mut Criterion) {
    let mut group = c.benchmark_group("apu_write_granularity");

    // Drivers write between short runs; more writes mean more slices
    for writes in [1u32, 16, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(writes), &writes, |b, &writes| {
            let mut apu = apu_with(&[]);
            let step = apu.frame_length() / writes;
            b.iter(|| {
                for i in 0..writes {
                    apu.write(0x4002, i as u8);
                    apu.add_time(step);
                    apu.process();
                }
                black_box(apu.take_samples());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_frame, bench_write_granularity);
criterion_main!(benches);
