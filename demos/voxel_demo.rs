use clap::Parser;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use record_hashmap::CoordinateHash;
use record_hashmap::DefaultKeyEq;
use record_hashmap::Device;
use record_hashmap::Hashmap;
use record_hashmap::HashmapConfig;

/// Voxelizes a random point cloud and counts the occupied voxels.
#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'n', long = "points", default_value_t = 100_000)]
    points: usize,

    #[arg(short = 'v', long = "voxel_size", default_value_t = 0.05)]
    voxel_size: f32,

    #[arg(short = 'd', long = "device", default_value = "CPU:0")]
    device: Device,

    #[arg(short = 's', long = "seed", default_value_t = 42)]
    seed: u64,
}

fn main() {
    let args = Args::parse();
    let mut rng = SmallRng::seed_from_u64(args.seed);

    let mut keys = Vec::with_capacity(args.points * 12);
    let mut values = Vec::with_capacity(args.points * 4);
    for i in 0..args.points {
        for _ in 0..3 {
            let coord: f32 = rng.random_range(-1.0..1.0);
            let voxel = (coord / args.voxel_size).floor() as i32;
            keys.extend_from_slice(&voxel.to_le_bytes());
        }
        values.extend_from_slice(&(i as u32).to_le_bytes());
    }

    let config = HashmapConfig::new(12, 4)
        .with_capacity(args.points)
        .on_device(args.device);
    let mut map = match config.build::<CoordinateHash, DefaultKeyEq>() {
        Ok(map) => map,
        Err(err) => {
            eprintln!("cannot create hashmap on {}: {err}", args.device);
            std::process::exit(1);
        }
    };

    println!(
        "Voxelizing {} points at voxel size {} on {}",
        args.points, args.voxel_size, args.device
    );

    let inserted = map.insert(&keys, &values).expect("insert failed");
    println!(
        "Occupied voxels: {} ({} points fell into an occupied voxel)",
        inserted.success_count(),
        inserted.len() - inserted.success_count()
    );

    let found = map.search(&keys).expect("search failed");
    let first_point = found
        .handles()
        .iter()
        .filter_map(|handle| map.value(*handle))
        .map(|value| u32::from_le_bytes(value.try_into().unwrap()))
        .take(5)
        .collect::<Vec<_>>();
    println!("First point index of the first five searched voxels: {first_point:?}");
    println!(
        "Load: {} entries, capacity {} ({:.2}%)",
        map.len(),
        map.capacity(),
        map.len() as f64 / map.capacity().max(1) as f64 * 100.0
    );

    match map.remove(&keys[..12]) {
        Ok(_) => println!("remove succeeded"),
        Err(err) => println!("remove: {err}"),
    }
}
