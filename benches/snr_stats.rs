use std::hint::black_box;
use criterion::{criterion_group, criterion_main, Criterion};
use heart_snr::stats::{permutation_t_test, Correction};
use heart_snr::{compute_snr, evoked_from_raw, Condition, Evoked, SnrConfig, Window};
use ndarray::Array2;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_xoshiro::Xoshiro256PlusPlus;

fn noise(shape: (usize, usize), seed: u64) -> Array2<f64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    Array2::from_shape_simple_fn(shape, || normal.sample(&mut rng))
}

fn evoked() -> Evoked {
    let names = (0..40).map(|i| if i == 0 { "SC6".to_string() } else { format!("S{i}") }).collect();
    Evoked::new(noise((40, 400), 1), 1000.0, -0.2, names, 1, None).unwrap()
}

fn bench_compute_snr(c: &mut Criterion) {
    let ev = evoked();
    let baseline = Window::new(-0.15, -0.05).unwrap();
    let cfg = SnrConfig::default();
    c.bench_function("compute_snr [40×400]", |b| {
        b.iter(|| compute_snr(black_box(&ev), Condition::Median, &baseline, &cfg).unwrap())
    });
}

fn bench_evoked_from_raw(c: &mut Criterion) {
    // 60 s @ 1 kHz, one beat per second.
    let data = noise((40, 60_000), 2);
    let names: Vec<String> = (0..40).map(|i| format!("S{i}")).collect();
    let events: Vec<usize> = (1..60).map(|s| s * 1000).collect();
    let epoch = Window::new(-0.2, 0.2).unwrap();
    let baseline = Window::new(-0.15, -0.05).unwrap();
    c.bench_function("evoked_from_raw [40×60000, 59 beats]", |b| {
        b.iter(|| {
            evoked_from_raw(black_box(&data), 1000.0, &names, &events, &epoch, &baseline).unwrap()
        })
    });
}

fn bench_permutation(c: &mut Criterion) {
    let x = noise((36, 5), 3);
    c.bench_function("permutation_t_test [36×5, 2000 flips]", |b| {
        b.iter(|| permutation_t_test(black_box(x.view()), 2000, 42, Correction::MaxStatistic).unwrap())
    });
}

criterion_group!(benches, bench_compute_snr, bench_evoked_from_raw, bench_permutation);
criterion_main!(benches);
