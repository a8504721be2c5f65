//! Integration tests for convolvo-core engines.
//!
//! Every engine is checked against direct time-domain convolution with
//! deterministic noise: identity impulses, sample conservation, cross-engine
//! equivalence, silence skipping, channel independence, threaded draining and
//! reconfiguration.

use convolvo_core::{
    CompositeEngine, Convolver, DirectEngine, ImpulseStore, Output, Sample, ThreadedEngine,
    drain_into,
};

const TOLERANCE: f64 = 1e-5;

/// Deterministic white noise in [-1, 1) (xorshift32).
fn noise(len: usize, seed: u32) -> Vec<Sample> {
    let mut state = seed.max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state as f32 / u32::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}

/// Noise shaped by an exponential decay, like a small room.
fn room(len: usize, seed: u32) -> Vec<Sample> {
    noise(len, seed)
        .into_iter()
        .enumerate()
        .map(|(i, s)| 0.3 * s * (-(i as f32) / (len as f32 / 6.0)).exp())
        .collect()
}

/// Direct convolution of `input` with `impulse`, first `input.len()` samples.
fn reference(input: &[Sample], impulse: &[Sample]) -> Vec<f64> {
    (0..input.len())
        .map(|n| {
            impulse
                .iter()
                .take(n + 1)
                .enumerate()
                .map(|(k, &h)| f64::from(h) * f64::from(input[n - k]))
                .sum()
        })
        .collect()
}

/// Feeds every channel in the cycling `chunks` pattern, then silence until
/// `len + latency` samples came out of each channel.
fn render(engine: &mut dyn Convolver, input: &[Vec<Sample>], chunks: &[usize]) -> Vec<Vec<Sample>> {
    let len = input[0].len();
    let mut out = vec![Vec::new(); input.len()];
    let mut pos = 0;
    for &chunk in chunks.iter().cycle() {
        if pos >= len {
            break;
        }
        let n = chunk.min(len - pos);
        let slices: Vec<&[Sample]> = input.iter().map(|c| &c[pos..pos + n]).collect();
        engine.add(&slices, n);
        drain_into(engine, &mut out, usize::MAX);
        pos += n;
    }

    let target = len + engine.latency();
    let silence = vec![0.0; 64];
    let slices: Vec<&[Sample]> = input.iter().map(|_| &silence[..]).collect();
    while out[0].len() < target {
        engine.add(&slices, silence.len());
        drain_into(engine, &mut out, usize::MAX);
    }
    out
}

fn assert_close(label: &str, output: &[Sample], latency: usize, expected: &[f64]) {
    for (n, &e) in expected.iter().enumerate() {
        let got = f64::from(output[n + latency]);
        assert!(
            (got - e).abs() <= TOLERANCE * e.abs().max(1.0),
            "{label}: sample {n} is {got}, expected {e}"
        );
    }
    assert!(
        output[..latency].iter().all(|&s| s == 0.0),
        "{label}: output before latency must be silent"
    );
}

/// Every engine kind under test, configured for `impulse`.
fn engines(impulse: &ImpulseStore<'_>) -> Vec<(&'static str, Box<dyn Convolver>)> {
    let mut brute = DirectEngine::new();
    brute.set_impulse(impulse, 0, 0, 0, true).unwrap();

    let mut fft = DirectEngine::new();
    fft.set_impulse(impulse, 256, 0, 0, false).unwrap();

    let mut zero_latency = CompositeEngine::new();
    zero_latency.set_impulse(impulse, 256, 32, 0, 0, 0).unwrap();

    let mut low_latency = CompositeEngine::new();
    low_latency.set_impulse(impulse, 512, 0, 0, 0, 64).unwrap();

    let mut threaded = ThreadedEngine::new();
    threaded.enable_thread(true);
    threaded.set_impulse(impulse, 128, 32, 0, 0, 0).unwrap();

    let mut unthreaded = ThreadedEngine::new();
    unthreaded.set_impulse(impulse, 128, 32, 0, 0, 0).unwrap();

    let mut all: Vec<(&'static str, Box<dyn Convolver>)> = Vec::new();
    all.push(("direct brute force", Box::new(brute)));
    all.push(("direct fft", Box::new(fft)));
    all.push(("composite zero latency", Box::new(zero_latency)));
    all.push(("composite 64 latency", Box::new(low_latency)));
    all.push(("threaded", Box::new(threaded)));
    all.push(("threaded disabled", Box::new(unthreaded)));
    all
}

// ============================================================================
// Identity and equivalence
// ============================================================================

#[test]
fn identity_impulse_delays_by_latency() {
    let impulse = ImpulseStore::mono(vec![1.0]);
    let input = vec![noise(3000, 1)];

    for (label, mut engine) in engines(&impulse) {
        for chunks in [&[1][..], &[64], &[7, 300, 13, 64]] {
            engine.reset();
            let latency = engine.latency();
            let out = render(engine.as_mut(), &input, chunks);
            for (n, &s) in input[0].iter().enumerate() {
                assert!(
                    (out[0][n + latency] - s).abs() < 1e-5,
                    "{label}: sample {n} with chunks {chunks:?}"
                );
            }
            assert!(out[0][..latency].iter().all(|&s| s == 0.0), "{label}");
        }
    }
}

#[test]
fn engines_match_direct_convolution() {
    let h = room(700, 7);
    let impulse = ImpulseStore::mono(h.clone());
    let input = vec![noise(5000, 3)];
    let expected = reference(&input[0], &h);

    for (label, mut engine) in engines(&impulse) {
        let latency = engine.latency();
        let out = render(engine.as_mut(), &input, &[100, 37, 256]);
        assert_close(label, &out[0], latency, &expected);
    }
}

#[test]
fn threaded_engine_with_long_tail_matches_reference() {
    let h = room(8000, 19);
    let impulse = ImpulseStore::mono(h.clone());
    let input = vec![noise(10_000, 23)];
    let expected = reference(&input[0], &h);

    let mut engine = ThreadedEngine::new();
    engine.enable_thread(true);
    let latency = engine.set_impulse(&impulse, 2048, 128, 0, 0, 0).unwrap();
    assert!(engine.is_threaded());
    assert_eq!(latency, 0);

    let out = render(&mut engine, &input, &[128]);
    assert_close("threaded long tail", &out[0], latency, &expected);
}

// ============================================================================
// Conservation and draining
// ============================================================================

#[test]
fn output_count_follows_input_count() {
    let impulse = ImpulseStore::mono(room(900, 5));

    for (label, mut engine) in engines(&impulse) {
        let latency = engine.latency();
        let mut produced = 0;
        let mut added = 0;
        for (i, &chunk) in [13usize, 128, 1, 500, 64, 77].iter().cycle().take(60).enumerate() {
            let block = noise(chunk, i as u32 + 1);
            engine.add(&[&block], chunk);
            added += chunk;

            let ready = engine.avail(usize::MAX);
            assert_eq!(Output::new(engine.as_ref()).len(), ready, "{label}: get must match avail");
            engine.advance(ready);
            produced += ready;

            assert!(produced <= added + latency, "{label}: produced ahead of input");
            assert!(produced >= added, "{label}: output fell behind input");
        }
    }
}

#[test]
fn avail_is_stable_without_add() {
    let impulse = ImpulseStore::mono(room(3000, 9));
    for (label, mut engine) in engines(&impulse) {
        let block = noise(333, 4);
        engine.add(&[&block], block.len());
        let first = engine.avail(usize::MAX);
        let second = engine.avail(usize::MAX);
        assert_eq!(first, second, "{label}");
        assert!(engine.avail(10) >= 10.min(first), "{label}");
    }
}

#[test]
fn threaded_drain_terminates() {
    let impulse = ImpulseStore::mono(room(20_000, 2));
    let mut engine = ThreadedEngine::new();
    engine.enable_thread(true);
    engine.set_impulse(&impulse, 1024, 256, 0, 0, 0).unwrap();
    assert!(engine.is_threaded());

    let input = noise(10_000, 8);
    let mut total = 0;
    for block in input.chunks(256) {
        engine.add(&[block], block.len());
        let ready = engine.avail(64);
        engine.advance(ready);
        total += ready;
    }

    let mut iterations = 0;
    loop {
        let ready = engine.avail(usize::MAX);
        if ready == 0 {
            break;
        }
        engine.advance(ready);
        total += ready;
        iterations += 1;
        assert!(iterations < 100, "drain did not terminate");
    }
    assert_eq!(total, input.len());
}

// ============================================================================
// Silence skipping and channels
// ============================================================================

#[test]
fn silent_runs_match_reference() {
    let mut h = vec![0.0; 4000];
    h[..50].copy_from_slice(&room(50, 3));
    h[3000..3100].copy_from_slice(&room(100, 4));
    let impulse = ImpulseStore::mono(h.clone());

    let mut signal = noise(12_000, 6);
    signal[1000..7000].fill(0.0);
    let input = vec![signal];
    let expected = reference(&input[0], &h);

    for (label, mut engine) in engines(&impulse) {
        let latency = engine.latency();
        let out = render(engine.as_mut(), &input, &[256]);
        assert_close(label, &out[0], latency, &expected);
    }
}

#[test]
fn channels_are_independent() {
    let h = room(600, 12);
    let input: Vec<Vec<Sample>> = (0..4).map(|ch| noise(4000, 40 + ch)).collect();

    let mut stereo = ImpulseStore::mono(h.clone());
    stereo.set_num_channels(4, true);
    let mut together = CompositeEngine::new();
    together.set_impulse(&stereo, 0, 64, 0, 0, 0).unwrap();
    let joint = render(&mut together, &input, &[64, 100]);

    let mono = ImpulseStore::mono(h);
    for (ch, signal) in input.iter().enumerate() {
        let mut alone = CompositeEngine::new();
        alone.set_impulse(&mono, 0, 64, 0, 0, 0).unwrap();
        let single = render(&mut alone, std::slice::from_ref(signal), &[64, 100]);
        for (n, (a, b)) in joint[ch].iter().zip(&single[0]).enumerate().take(4000) {
            assert!((a - b).abs() < 1e-6, "channel {ch} sample {n}: {a} vs {b}");
        }
    }
}

#[test]
fn stereo_impulse_applies_per_channel() {
    let left = room(300, 1);
    let right = room(300, 2);
    let impulse = ImpulseStore::from_channels(vec![left.clone(), right.clone()]);
    let input = vec![noise(2000, 10), noise(2000, 11)];

    let mut engine = CompositeEngine::new();
    let latency = engine.set_impulse(&impulse, 0, 0, 0, 0, 0).unwrap();
    let out = render(&mut engine, &input, &[96]);
    assert_close("left", &out[0], latency, &reference(&input[0], &left));
    assert_close("right", &out[1], latency, &reference(&input[1], &right));
}

#[test]
fn referenced_impulse_matches_owned() {
    let h = room(1000, 77);
    let input = vec![noise(3000, 5)];

    let mut owned = CompositeEngine::new();
    owned.set_impulse(&ImpulseStore::mono(h.clone()), 0, 128, 0, 0, 0).unwrap();
    let a = render(&mut owned, &input, &[128]);

    let mut borrowed_store = ImpulseStore::new();
    borrowed_store.set_referenced(&[&h], h.len());
    let mut borrowed = CompositeEngine::new();
    borrowed.set_impulse(&borrowed_store, 0, 128, 0, 0, 0).unwrap();
    let b = render(&mut borrowed, &input, &[128]);

    assert_eq!(a, b);
}

// ============================================================================
// Reconfiguration
// ============================================================================

#[test]
fn reconfiguration_never_mixes_impulses() {
    let first = ImpulseStore::mono(room(5000, 1));
    let second = ImpulseStore::mono(room(5000, 2));
    let input = vec![noise(6000, 3)];

    let mut fresh = ThreadedEngine::new();
    fresh.enable_thread(true);
    fresh.set_impulse(&second, 1024, 64, 0, 0, 0).unwrap();
    let expected = render(&mut fresh, &input, &[64]);

    let mut engine = ThreadedEngine::new();
    engine.enable_thread(true);
    engine.set_impulse(&first, 1024, 64, 0, 0, 0).unwrap();
    let warmup = noise(2000, 9);
    engine.add(&[&warmup], warmup.len());
    let ready = engine.avail(500);
    engine.advance(ready.min(500));

    engine.set_impulse(&second, 1024, 64, 0, 0, 0).unwrap();
    let got = render(&mut engine, &input, &[64]);

    for (n, (a, b)) in got[0].iter().zip(&expected[0]).enumerate() {
        assert!((a - b).abs() < 1e-6, "sample {n}: {a} vs {b}");
    }
}

#[test]
fn reset_returns_to_silence() {
    let impulse = ImpulseStore::mono(room(2500, 31));
    let input = vec![noise(4000, 32)];

    for (label, mut engine) in engines(&impulse) {
        let before = render(engine.as_mut(), &input, &[200]);
        let tail = noise(123, 33);
        engine.add(&[&tail], tail.len());
        engine.reset();
        let after = render(engine.as_mut(), &input, &[200]);
        for (n, (a, b)) in before[0].iter().zip(&after[0]).enumerate().take(4000) {
            assert!((a - b).abs() < 1e-6, "{label}: sample {n}");
        }
    }
}

#[test]
fn failed_configuration_keeps_engine_running() {
    let impulse = ImpulseStore::mono(vec![1.0]);
    let mut engine = CompositeEngine::new();
    engine.set_impulse(&impulse, 0, 0, 0, 0, 0).unwrap();

    assert!(engine.set_impulse(&impulse, 0, 0, 0, 10, 0).is_err());

    let block = noise(64, 1);
    engine.add(&[&block], 64);
    assert_eq!(engine.avail(64), 64);
    assert_eq!(engine.get().channel(0), &block[..]);
}

#[test]
fn process_copies_ready_output() {
    let impulse = ImpulseStore::mono(vec![0.5]);
    let mut engine = DirectEngine::new();
    engine.set_impulse(&impulse, 0, 0, 0, false).unwrap();

    let input = [1.0, 2.0, 3.0, 4.0];
    let mut output = [0.0; 4];
    let written = engine.process(&[&input], &mut [&mut output]);
    assert_eq!(written, 4);
    assert_eq!(output, [0.5, 1.0, 1.5, 2.0]);
}
