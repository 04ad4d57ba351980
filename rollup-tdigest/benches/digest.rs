use divan::{Bencher, black_box};
use rollup_tdigest::TDigest;

fn main() {
    divan::main();
}

const COMPRESSION: &[f64] = &[20.0, 100.0, 500.0];
const ITEMS: usize = 10_000;

fn filled(compression: f64) -> TDigest {
    let mut digest = TDigest::new(compression);
    for i in 0..ITEMS {
        digest.add((i * 7919 % ITEMS) as f64, 1.0).unwrap();
    }
    digest
}

#[divan::bench(args = COMPRESSION)]
fn add(bencher: Bencher, compression: f64) {
    bencher
        .with_inputs(|| TDigest::new(compression))
        .bench_values(|mut digest| {
            for i in 0..ITEMS {
                digest.add(black_box(i as f64), 1.0).unwrap();
            }
            digest
        });
}

#[divan::bench(args = COMPRESSION)]
fn quantile(bencher: Bencher, compression: f64) {
    bencher
        .with_inputs(|| {
            let mut digest = filled(compression);
            digest.compress();
            digest
        })
        .bench_refs(|digest| digest.quantile(black_box(0.99)).unwrap());
}

#[divan::bench(args = COMPRESSION)]
fn merge(bencher: Bencher, compression: f64) {
    let other = filled(compression);
    bencher
        .with_inputs(|| filled(compression))
        .bench_refs(|digest| digest.merge(&other).unwrap());
}

#[divan::bench(args = COMPRESSION)]
fn encode(bencher: Bencher, compression: f64) {
    bencher
        .with_inputs(|| filled(compression))
        .bench_refs(|digest| digest.encode().unwrap());
}
