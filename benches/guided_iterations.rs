use std::time::Duration;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use pathguide::{
    Camera, RenderSettings, Rgb, Scene,
    geometry::{Ray, ScreenSize, Triangle, WorldPoint, WorldVector},
    render,
    scene::{Environment, Material, Mesh, Object as _, triangle_bvh::TriangleBvh},
};
use rand::{Rng as _, SeedableRng as _, rngs::SmallRng};

/// Bumpy height field over [-1, 1]^2, `n` by `n` quads.
fn height_field(n: usize) -> Mesh {
    let vertices = (0..=n)
        .flat_map(|j| (0..=n).map(move |i| (i, j)))
        .map(|(i, j)| {
            let x = 2.0 * i as f32 / n as f32 - 1.0;
            let y = 2.0 * j as f32 / n as f32 - 1.0;
            WorldPoint::new(x, y, 0.1 * (5.0 * x).sin() * (7.0 * y).cos())
        })
        .collect();
    let index = |i: usize, j: usize| j * (n + 1) + i;
    let triangles = (0..n)
        .flat_map(|j| (0..n).map(move |i| (i, j)))
        .flat_map(|(i, j)| {
            [
                Triangle::new(index(i, j), index(i + 1, j), index(i + 1, j + 1)),
                Triangle::new(index(i, j), index(i + 1, j + 1), index(i, j + 1)),
            ]
        })
        .collect();

    Mesh::new(vertices, triangles)
}

fn bvh_traversal(c: &mut Criterion) {
    let bvh = TriangleBvh::new(&height_field(200));
    let mut rng = SmallRng::seed_from_u64(0);
    let rays: Vec<Ray> = (0..10_000)
        .map(|_| {
            let origin = WorldPoint::new(
                rng.random_range(-1.5..1.5),
                rng.random_range(-1.5..1.5),
                2.0,
            );
            let target = WorldPoint::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                0.0,
            );
            Ray::new(origin, target - origin)
        })
        .collect();

    c.bench_function("bvh_traversal", |b| {
        b.iter(|| rays.iter().filter(|ray| bvh.intersect(ray).is_some()).count())
    });
}

fn guided_iterations(c: &mut Criterion) {
    let scene = Scene {
        object: TriangleBvh::new(&height_field(64)),
        material: Material::Diffuse {
            albedo: Rgb::new(0.7, 0.7, 0.7),
        },
        environment: Environment::default(),
    };
    let camera = Camera::builder()
        .center(WorldPoint::new(0.0, -2.5, 1.5))
        .target(WorldPoint::origin())
        .up(WorldVector::new(0.0, 0.0, 1.0))
        .resolution(ScreenSize::new(128, 96))
        .build();
    let settings = RenderSettings::builder().iterations(4).build();

    c.bench_function("guided_iterations", |b| {
        b.iter_batched(
            || (scene.clone(), settings.clone()),
            |(scene, settings)| {
                render(scene, camera, settings, |_, _| {})
                    .unwrap()
                    .wait()
                    .unwrap()
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10).measurement_time(Duration::from_secs(30));
    targets = bvh_traversal, guided_iterations
}
criterion_main!(benches);
