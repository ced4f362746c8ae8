//! Call-path benchmarks
//!
//! Measures classification, argument marshaling and closure decoding.

use core::ffi::c_void;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rvffi::decode::FLOAT_FILE_SIZE;
use rvffi::marshal::ImageLayout;
use rvffi::{
    decode_args, prep_args, prep_cif, Abi, CifCache, DecodeScratch, SavedRegisters,
    TypeDescriptor as T, TypeRef,
};

fn mixed_signature(n: usize) -> Vec<TypeRef> {
    (0..n)
        .map(|i| match i % 4 {
            0 => T::sint32(),
            1 => T::double(),
            2 => T::pointer(),
            _ => T::structure(vec![T::float(), T::sint64()]).unwrap(),
        })
        .collect()
}

/// 16 bytes of backing storage per argument, enough for every kind above
fn argument_values(n: usize) -> (Vec<[u64; 2]>, Vec<*const c_void>) {
    let storage: Vec<[u64; 2]> = (0..n as u64).map(|i| [i, i + 1]).collect();
    let pointers = storage.iter().map(|v| v.as_ptr().cast()).collect();
    (storage, pointers)
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");

    for size in [2, 8, 32].iter() {
        group.bench_with_input(BenchmarkId::new("prep_cif", size), size, |b, &size| {
            let args = mixed_signature(size);
            b.iter(|| prep_cif(Abi::Rv64, T::double(), black_box(args.clone())).unwrap());
        });
    }

    let cache = CifCache::new();
    let args = mixed_signature(8);
    let rtype = T::double();
    group.bench_function("cache_hit", |b| {
        b.iter(|| cache.get_or_prep(Abi::Rv64, black_box(&rtype), black_box(&args)).unwrap());
    });

    group.finish();
}

fn bench_marshal(c: &mut Criterion) {
    let mut group = c.benchmark_group("marshal");

    for abi in Abi::ALL {
        for size in [4, 16].iter() {
            group.bench_with_input(BenchmarkId::new(abi.name(), size), size, |b, &size| {
                let cif = prep_cif(abi, T::void(), mixed_signature(size)).unwrap();
                let (_storage, avalue) = argument_values(size);
                let mut image = vec![0u8; cif.bytes()];
                b.iter(|| unsafe {
                    prep_args(&cif, black_box(&avalue), core::ptr::null_mut(), &mut image);
                });
            });
        }
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for size in [4, 16].iter() {
        group.bench_with_input(BenchmarkId::new("rv64", size), size, |b, &size| {
            let cif = prep_cif(Abi::Rv64, T::void(), mixed_signature(size)).unwrap();
            let (_storage, avalue) = argument_values(size);
            let mut image = vec![0u8; cif.bytes()];
            unsafe { prep_args(&cif, &avalue, core::ptr::null_mut(), &mut image) };

            let mut ar = ImageLayout::for_cif(&cif).linearize(&image);
            let mut fpr = [0u8; FLOAT_FILE_SIZE];
            let regs = SavedRegisters::new(&mut ar, &mut fpr);
            let mut scratch = DecodeScratch::new();

            b.iter(|| unsafe {
                decode_args(&cif, core::ptr::null_mut(), &regs, black_box(&mut scratch))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_classify, bench_marshal, bench_decode);
criterion_main!(benches);
