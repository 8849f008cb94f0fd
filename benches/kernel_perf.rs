#[macro_use]
extern crate criterion;
use bitmc::kernels::evaluate_gate;
use bitmc::layers::Op;
use bitmc::sampler::{Prng, Sampler};
use bitmc::tally::count_ones;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::Rng;
use rand::SeedableRng;
use rand_hc::Hc128Rng;

const WORDS: usize = 1 << 14;

macro_rules! bench_gate {
    ($group:expr, $name:expr, $op:expr, $n:expr, $w:ty) => {
        let mut rng = Hc128Rng::seed_from_u64(0);
        $group.bench_with_input(BenchmarkId::new($name, $n), &$n, |b, _| {
            b.iter_batched(
                || {
                    let inputs: Vec<Vec<$w>> = (0..$n).map(|_| (0..WORDS).map(|_| rng.gen()).collect()).collect();
                    (inputs, vec![0 as $w; WORDS])
                },
                |(inputs, mut out)| {
                    let positive: Vec<&[$w]> = inputs.iter().map(|x| x.as_slice()).collect();
                    evaluate_gate($op, &positive, &[], &mut out, 256);
                    out
                },
                BatchSize::LargeInput,
            )
        });
    };
}

macro_rules! bench_sampler {
    ($group:expr, $name:expr, $prng:expr, $w:ty) => {
        $group.bench_function($name, |b| {
            let mut sampler = Sampler::new($prng, 0, &[0.3; 8], num_cpus::get()).unwrap();
            let mut words = vec![0 as $w; 8 * WORDS];
            b.iter(|| sampler.fill(0, black_box(&mut words), WORDS))
        });
    };
}

fn gates(c: &mut Criterion) {
    let mut group = c.benchmark_group("gates");

    bench_gate!(group, "and_u64", Op::And, 2, u64);
    bench_gate!(group, "and_u64", Op::And, 8, u64);
    bench_gate!(group, "xor_u64", Op::Xor, 8, u64);
    bench_gate!(group, "and_u8", Op::And, 8, u8);
    bench_gate!(group, "and_u32", Op::And, 8, u32);

    group.finish()
}

fn cardinality(c: &mut Criterion) {
    let mut group = c.benchmark_group("cardinality");

    bench_gate!(group, "atleast2_u64", Op::AtLeast(2), 3, u64);
    bench_gate!(group, "atleast2_u64", Op::AtLeast(2), 8, u64);
    bench_gate!(group, "atleast8_u64", Op::AtLeast(8), 16, u64);
    bench_gate!(group, "exactly4_u32", Op::Exactly(4), 8, u32);

    group.finish()
}

fn sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("sampling");

    bench_sampler!(group, "mt_u64", Prng::Mt19937_64, u64);
    bench_sampler!(group, "philox_u64", Prng::Philox4x64, u64);
    bench_sampler!(group, "mt_u8", Prng::Mt19937_64, u8);

    group.finish()
}

fn tally(c: &mut Criterion) {
    let mut rng = Hc128Rng::seed_from_u64(0);
    let words: Vec<u64> = (0..WORDS * 16).map(|_| rng.gen()).collect();
    c.bench_function("count_ones_u64", |b| b.iter(|| count_ones(black_box(&words))));
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = gates, cardinality, sampling, tally
}

criterion_main!(benches);
