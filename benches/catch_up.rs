// SPDX-License-Identifier: MPL-2.0
//! Benchmarks for frame catch-up.
//!
//! Measures the cost of one `current_frame` call after the position has run
//! ahead of the decoder:
//! - stepping every frame (the default)
//! - jumping to the intra frame first (seek threshold policy)

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use vidclock::clock::ManualClock;
use vidclock::config::PlayerConfig;
use vidclock::decoder::{SyntheticDecoder, SyntheticStream};
use vidclock::Player;

const GAPS: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(10)];

/// A playing player whose position is `gap` ahead of its decoder.
fn stalled_player(gap: Duration, config: &PlayerConfig) -> Player<SyntheticDecoder> {
    let stream = SyntheticStream::new(320, 180, 30.0, Duration::from_secs(60));
    let clock = ManualClock::new();
    let player = Player::open_with_clock(
        SyntheticDecoder::new(stream),
        None,
        config,
        Arc::new(clock.clone()),
    )
    .unwrap();
    player.play();
    clock.advance(gap);
    player
}

fn bench_catch_up(c: &mut Criterion) {
    let mut group = c.benchmark_group("catch_up");

    let stepwise = PlayerConfig::default();
    let seeking = PlayerConfig {
        catch_up_seek_threshold_frames: Some(30),
        ..PlayerConfig::default()
    };

    for gap in GAPS {
        group.bench_with_input(
            BenchmarkId::new("stepwise", gap.as_secs()),
            &gap,
            |b, &gap| {
                b.iter_batched(
                    || stalled_player(gap, &stepwise),
                    |mut player| {
                        black_box(player.current_frame());
                    },
                    criterion::BatchSize::LargeInput,
                );
            },
        );
        group.bench_with_input(
            BenchmarkId::new("seek_threshold", gap.as_secs()),
            &gap,
            |b, &gap| {
                b.iter_batched(
                    || stalled_player(gap, &seeking),
                    |mut player| {
                        black_box(player.current_frame());
                    },
                    criterion::BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_catch_up);
criterion_main!(benches);
