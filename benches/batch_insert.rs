use core::hint::black_box;

use criterion::AxisScale;
use criterion::BatchSize;
use criterion::Criterion;
use criterion::PlotConfiguration;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use hashbrown::HashMap as HashbrownHashMap;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use record_hashmap::CoordinateHash;
use record_hashmap::CpuHashmap;
use record_hashmap::DefaultHash;
use record_hashmap::DefaultKeyEq;
use record_hashmap::Device;
use record_hashmap::Hashmap;
use record_hashmap::KeyHash;

const SIZES: [usize; 4] = [1 << 8, 1 << 11, 1 << 14, 1 << 17];

/// Packed voxel keys with roughly one duplicate per four records.
fn voxel_batch(len: usize) -> (Vec<u8>, Vec<u8>) {
    let mut rng = SmallRng::seed_from_u64(len as u64);
    let extent = ((len as f64 * 0.75).cbrt().ceil() as i32).max(1);

    let mut keys = Vec::with_capacity(len * 12);
    let mut values = Vec::with_capacity(len * 4);
    for i in 0..len {
        for _ in 0..3 {
            keys.extend_from_slice(&rng.random_range(0..extent).to_le_bytes());
        }
        values.extend_from_slice(&(i as u32).to_le_bytes());
    }
    (keys, values)
}

fn bench_insert_batch<H: KeyHash>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!(
        "insert_batch_{}",
        core::any::type_name::<H>()
    ));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for size in SIZES {
        let (keys, values) = voxel_batch(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("record_hashmap/{size}"), |b| {
            b.iter_batched(
                || CpuHashmap::<H, DefaultKeyEq>::new(0, 12, 4, Device::cpu()).unwrap(),
                |mut map| {
                    black_box(map.insert(&keys, &values).unwrap());
                    map
                },
                BatchSize::LargeInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                HashbrownHashMap::<[u8; 12], [u8; 4]>::new,
                |mut map| {
                    let mut masks = Vec::with_capacity(size);
                    for (key, value) in keys.chunks_exact(12).zip(values.chunks_exact(4)) {
                        let key: [u8; 12] = key.try_into().unwrap();
                        let fresh = !map.contains_key(&key);
                        if fresh {
                            map.insert(key, value.try_into().unwrap());
                        }
                        masks.push(u8::from(fresh));
                    }
                    black_box(masks);
                    map
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_search_batch<H: KeyHash>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!(
        "search_batch_{}",
        core::any::type_name::<H>()
    ));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for size in SIZES {
        let (keys, values) = voxel_batch(size);
        let mut map = CpuHashmap::<H, DefaultKeyEq>::new(size, 12, 4, Device::cpu()).unwrap();
        map.insert(&keys, &values).unwrap();

        // Half of the queries fall outside the inserted extent.
        let (mut queries, _) = voxel_batch(size * 2);
        for lane in queries.chunks_exact_mut(4).skip(size * 3) {
            lane.copy_from_slice(&(-1i32).to_le_bytes());
        }

        group.throughput(Throughput::Elements(size as u64 * 2));
        group.bench_function(format!("record_hashmap/{size}"), |b| {
            b.iter(|| black_box(map.search(black_box(&queries)).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_batch::<DefaultHash>,
    bench_insert_batch::<CoordinateHash>,
    bench_search_batch::<DefaultHash>,
    bench_search_batch::<CoordinateHash>,
);

criterion_main!(benches);
