use std::{
    ops::Deref as _,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
};

use anyhow::{Context as _, anyhow, ensure};
use image::{GenericImage, GenericImageView, RgbaImage};

use crate::{
    camera::Camera,
    geometry::ScreenBlock,
    guiding::{GuidingStatistics, SpatialBinaryTree, save_quadtree_snapshot},
    renderer::{MAX_ITERATIONS, RenderOutput, RenderSettings, integrator::Guide, worker::Worker},
    scene::{Object, Scene},
    screen_block::ScreenBlockExt,
};

/// Relative margin added around the scene box, so that points on its faces are inside the
/// guiding tree.
const GUIDING_BOUNDS_MARGIN: f32 = 1e-3;

/// Starts rendering on a background driver thread and returns a handle to it.
///
/// The driver runs the guiding iterations one after another, each of them rendering the whole
/// image with all workers. `finished_tile_callback` is called from the worker threads.
pub fn render<O, F>(
    scene: Scene<O>,
    camera: Camera,
    settings: RenderSettings,
    finished_tile_callback: F,
) -> anyhow::Result<RenderProgress<O>>
where
    O: Object + Send + Sync + 'static,
    F: Fn(ScreenBlock, Progress) + Send + Sync + 'static,
{
    ensure!(
        settings.iterations <= MAX_ITERATIONS,
        "At most {MAX_ITERATIONS} iterations are supported, got {}",
        settings.iterations
    );

    let resolution = camera.get_resolution();
    let guide = SpatialBinaryTree::new(
        scene.object.get_bounding_box().inflate(GUIDING_BOUNDS_MARGIN),
        settings.guiding_settings,
    );
    let tile_ordering = ScreenBlock::from_size(resolution).tile_ordering(settings.tile_size.get());

    let state = Arc::new(RenderState {
        scene,
        camera,
        settings,

        image: Mutex::new(RgbaImage::new(resolution.x, resolution.y)),
        guide: RwLock::new(guide),

        tile_ordering,
        next_tile_index: AtomicUsize::new(0),
        finished_tiles: AtomicUsize::new(0),
        iteration: AtomicU32::new(0),
        aborted: AtomicBool::new(false),
    });

    let driver = thread::Builder::new().name("driver".to_string()).spawn({
        let state = Arc::clone(&state);
        move || drive(&state, &finished_tile_callback)
    })?;

    Ok(RenderProgress {
        render_state: state,
        driver,
    })
}

/// Snapshot of how far a render got.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Iteration currently being rendered, zero based
    pub iteration: u32,
    pub iterations: u32,
    /// Finished tiles of the current iteration
    pub finished_tiles: usize,
    pub total_tiles: usize,
}

impl Progress {
    /// Overall completion in 0-1, weighted by the samples each iteration takes.
    /// Work is measured in units of `2^iterations` samples, so that no power of two is ever
    /// formed.
    pub fn fraction(&self) -> f32 {
        let iterations = f64::from(self.iterations);
        let total_work = 1.0 - (-iterations).exp2();
        if total_work <= 0.0 || self.total_tiles == 0 {
            return 1.0;
        }
        let current_work = (f64::from(self.iteration) - iterations).exp2();
        let tiles = self.finished_tiles as f64 / self.total_tiles as f64;
        let done_work = current_work * (1.0 + tiles) - (-iterations).exp2();
        (done_work / total_work).clamp(0.0, 1.0) as f32
    }
}

pub struct RenderProgress<O: Object> {
    render_state: Arc<RenderState<O>>,
    driver: JoinHandle<anyhow::Result<GuidingStatistics>>,
}

impl<O: Object> RenderProgress<O> {
    pub fn progress(&self) -> Progress {
        self.render_state.progress()
    }

    pub fn is_finished(&self) -> bool {
        self.driver.is_finished()
    }

    /// Signal the driver to stop.
    /// The iteration in progress is still finished, so that the image stays a complete
    /// estimate, but no further iterations are started.
    pub fn abort(&self) {
        self.render_state.aborted.store(true, Ordering::Release);
    }

    /// Blocks until the driver finishes and returns the image of the last iteration.
    pub fn wait(self) -> anyhow::Result<RenderOutput> {
        let guiding_statistics = self
            .driver
            .join()
            .map_err(|_| anyhow!("Render driver thread panicked"))??;
        let image = self
            .render_state
            .image
            .lock()
            .expect("Poisoned lock!")
            .clone();

        Ok(RenderOutput {
            image,
            guiding_statistics,
        })
    }

    /// Image of the last finished iteration, black until the first one is done.
    pub fn image(&self) -> &Mutex<RgbaImage> {
        &self.render_state.image
    }
}

struct RenderState<O: Object> {
    scene: Scene<O>,
    camera: Camera,
    settings: RenderSettings,

    image: Mutex<RgbaImage>,
    guide: RwLock<SpatialBinaryTree>,

    tile_ordering: Vec<ScreenBlock>,
    next_tile_index: AtomicUsize,
    finished_tiles: AtomicUsize,
    iteration: AtomicU32,
    aborted: AtomicBool,
}

impl<O: Object> RenderState<O> {
    fn get_next_tile(&self) -> Option<&ScreenBlock> {
        let id = self.next_tile_index.fetch_add(1, Ordering::AcqRel);
        self.tile_ordering.get(id)
    }

    fn progress(&self) -> Progress {
        Progress {
            iteration: self.iteration.load(Ordering::Acquire),
            iterations: self.settings.iterations,
            finished_tiles: self.finished_tiles.load(Ordering::Acquire),
            total_tiles: self.tile_ordering.len(),
        }
    }
}

/// Body of the driver thread.
fn drive<O, F>(
    state: &RenderState<O>,
    finished_tile_callback: &F,
) -> anyhow::Result<GuidingStatistics>
where
    O: Object + Send + Sync,
    F: Fn(ScreenBlock, Progress) + Sync,
{
    let cores = core_affinity::get_core_ids().unwrap_or_default();
    let worker_count = state.settings.worker_count.unwrap_or(cores.len()).max(1);
    tracing::info!(
        worker_count,
        iterations = state.settings.iterations,
        guiding = state.settings.guiding,
        "render started"
    );

    for iteration in 0..state.settings.iterations {
        if state.aborted.load(Ordering::Acquire) {
            tracing::info!(iteration, "render aborted");
            break;
        }

        let samples_per_pixel = RenderSettings::samples_per_pixel(iteration);
        state.iteration.store(iteration, Ordering::Release);
        state.finished_tiles.store(0, Ordering::Release);
        state.next_tile_index.store(0, Ordering::Release);

        let image = render_iteration(
            state,
            samples_per_pixel,
            worker_count,
            &cores,
            finished_tile_callback,
        )?;
        *state.image.lock().expect("Poisoned lock!") = image;

        if state.settings.guiding {
            finish_guiding_iteration(state, iteration)?;
        }

        tracing::info!(iteration, samples_per_pixel, "iteration finished");
    }

    let mut guide = state.guide.write().expect("Poisoned lock!");
    let statistics = guide.statistics();
    tracing::info!(%statistics, "guiding structure");
    guide.reset();

    Ok(statistics)
}

/// Renders the whole image once, every pixel with `samples_per_pixel` fresh samples.
fn render_iteration<O, F>(
    state: &RenderState<O>,
    samples_per_pixel: u32,
    worker_count: usize,
    cores: &[core_affinity::CoreId],
    finished_tile_callback: &F,
) -> anyhow::Result<RgbaImage>
where
    O: Object + Send + Sync,
    F: Fn(ScreenBlock, Progress) + Sync,
{
    let resolution = state.camera.get_resolution();
    let image = Mutex::new(RgbaImage::new(resolution.x, resolution.y));

    thread::scope(|scope| -> anyhow::Result<()> {
        let threads = (0..worker_count)
            .map(|worker_id| {
                let core = cores.get(worker_id).copied();
                let image = &image;

                thread::Builder::new()
                    .name(format!("worker{worker_id}"))
                    .spawn_scoped(scope, move || {
                        if let Some(core) = core {
                            core_affinity::set_for_current(core);
                        }
                        render_tiles(state, samples_per_pixel, image, finished_tile_callback);
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for handle in threads {
            handle
                .join()
                .map_err(|_| anyhow!("Render worker thread panicked"))?;
        }
        Ok(())
    })?;

    Ok(image.into_inner().expect("Poisoned lock!"))
}

/// Worker loop, takes tiles until there are none left in this iteration.
fn render_tiles<O, F>(
    state: &RenderState<O>,
    samples_per_pixel: u32,
    image: &Mutex<RgbaImage>,
    finished_tile_callback: &F,
) where
    O: Object + Send + Sync,
    F: Fn(ScreenBlock, Progress) + Sync,
{
    let mut worker = Worker::new();
    let tile_size = state.settings.tile_size.get();
    let mut buffer = RgbaImage::new(tile_size, tile_size);

    while let Some(tile) = state.get_next_tile() {
        {
            let tree = state.guide.read().expect("Poisoned lock!");
            let guide = state.settings.guiding.then(|| Guide {
                tree: &*tree,
                bsdf_sampling_fraction: state.settings.guiding_settings.bsdf_sampling_fraction,
            });
            worker.render_tile(
                &state.scene,
                &state.camera,
                guide,
                state.settings.max_depth,
                samples_per_pixel,
                tile,
                &mut buffer,
            );
        }

        image
            .lock()
            .expect("Poisoned lock!")
            .copy_from(
                buffer.view(0, 0, tile.width(), tile.height()).deref(),
                tile.min.x,
                tile.min.y,
            )
            .unwrap_or_else(|_| unreachable!("The buffer should always fit into the output"));

        state.finished_tiles.fetch_add(1, Ordering::AcqRel);
        (finished_tile_callback)(tile.clone(), state.progress());
    }
}

/// Iteration boundary: freezes what was recorded for guiding the next iteration and refines
/// the spatial subdivision.
fn finish_guiding_iteration<O: Object>(
    state: &RenderState<O>,
    iteration: u32,
) -> anyhow::Result<()> {
    let mut guide = state.guide.write().expect("Poisoned lock!");

    match &state.settings.snapshot_dir {
        Some(dir) => {
            let mut result = Ok(());
            guide.promote_generation_with(|leaf, quadtree| {
                if result.is_ok() {
                    result = save_quadtree_snapshot(dir, iteration, leaf, quadtree).map(|_| ());
                }
            });
            result.with_context(|| {
                format!("Failed to save quadtree snapshots of iteration {iteration}")
            })?;
        }
        None => guide.promote_generation(),
    }

    guide.refine(iteration);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        geometry::{ScreenSize, Triangle, WorldPoint, WorldVector},
        guiding::{GuidingSettings, snapshot_path},
        scene::{Environment, Material, Mesh, triangle_bvh::TriangleBvh},
        util::Rgb,
    };

    use assert2::{assert, let_assert};
    use std::num::NonZeroU32;

    /// Diffuse floor under a uniform sky, seen from above.
    fn floor_scene() -> (Scene<TriangleBvh>, Camera) {
        let mesh = Mesh::new(
            vec![
                WorldPoint::new(-10.0, -10.0, 0.0),
                WorldPoint::new(10.0, -10.0, 0.0),
                WorldPoint::new(10.0, 10.0, 0.0),
                WorldPoint::new(-10.0, 10.0, 0.0),
            ],
            vec![Triangle::new(0, 1, 2), Triangle::new(0, 2, 3)],
        );
        let scene = Scene {
            object: TriangleBvh::new(&mesh),
            material: Material::Diffuse {
                albedo: Rgb::new(0.5, 0.5, 0.5),
            },
            environment: Environment::Uniform(Rgb::new(1.0, 1.0, 1.0)),
        };
        let camera = Camera::builder()
            .center(WorldPoint::new(0.0, 0.0, 5.0))
            .target(WorldPoint::origin())
            .up(WorldVector::new(0.0, 1.0, 0.0))
            .resolution(ScreenSize::new(16, 12))
            .build();
        (scene, camera)
    }

    fn small_settings() -> RenderSettings {
        RenderSettings::builder()
            .tile_size(NonZeroU32::new(8).unwrap())
            .iterations(3)
            .max_depth(3)
            .worker_count(2)
            .guiding_settings(GuidingSettings::builder().spatial_threshold(10.0).build())
            .build()
    }

    #[test]
    fn progress_fraction() {
        let progress = Progress {
            iteration: 1,
            iterations: 2,
            finished_tiles: 2,
            total_tiles: 4,
        };
        // 1 sample done, 1 of 2 samples in progress, out of 3
        assert!((progress.fraction() - 2.0 / 3.0).abs() < 1e-6);

        let empty = Progress {
            iteration: 0,
            iterations: 0,
            finished_tiles: 0,
            total_tiles: 0,
        };
        assert!(empty.fraction() == 1.0);
    }

    #[test]
    fn progress_fraction_of_many_iterations() {
        let halfway = Progress {
            iteration: 63,
            iterations: 64,
            finished_tiles: 0,
            total_tiles: 4,
        };
        assert!((halfway.fraction() - 0.5).abs() < 1e-6);

        let far_out = Progress {
            iteration: u32::MAX - 1,
            iterations: u32::MAX,
            finished_tiles: 4,
            total_tiles: 4,
        };
        assert!(far_out.fraction() == 1.0);
    }

    #[test]
    fn too_many_iterations_are_refused() {
        let (scene, camera) = floor_scene();
        let settings = RenderSettings::builder()
            .iterations(MAX_ITERATIONS + 1)
            .build();
        assert!(render(scene, camera, settings, |_, _| {}).is_err());
    }

    #[test]
    fn guided_render_of_lit_floor() {
        let (scene, camera) = floor_scene();
        let finished = Arc::new(AtomicUsize::new(0));

        let progress = render(scene, camera, small_settings(), {
            let finished = Arc::clone(&finished);
            move |_, _| {
                finished.fetch_add(1, Ordering::Relaxed);
            }
        })
        .unwrap();
        let_assert!(Ok(output) = progress.wait());

        // 2 x 2 tiles of 8 x 8 over a 16 x 12 image, in each of the 3 iterations
        assert!(finished.load(Ordering::Relaxed) == 12);
        assert!(output.image.dimensions() == (16, 12));
        assert!(output.guiding_statistics.spatial_leaves > 1);

        // Floor radiance is albedo times sky, 0.5 everywhere
        let mean = output
            .image
            .pixels()
            .map(|p| p.0[0] as f32 / 255.0)
            .sum::<f32>()
            / (16.0 * 12.0);
        assert!((mean - 0.5).abs() < 0.06);
        assert!(output.image.pixels().all(|p| p.0[3] == 255));
    }

    #[test]
    fn unguided_render_keeps_flat_tree() {
        let (scene, camera) = floor_scene();
        let settings = RenderSettings {
            guiding: false,
            ..small_settings()
        };

        let progress = render(scene, camera, settings, |_, _| {}).unwrap();
        let_assert!(Ok(output) = progress.wait());

        assert!(output.guiding_statistics.spatial_leaves == 1);
    }

    #[test]
    fn snapshots_of_every_iteration() {
        let (scene, camera) = floor_scene();
        let dir = std::env::temp_dir().join(format!(
            "pathguide_render_snapshots_{}",
            std::process::id()
        ));
        let settings = RenderSettings {
            snapshot_dir: Some(dir.clone()),
            ..small_settings()
        };

        let progress = render(scene, camera, settings, |_, _| {}).unwrap();
        let_assert!(Ok(_) = progress.wait());

        // The root is the only leaf before the first refinement
        assert!(snapshot_path(&dir, 0, 0).exists());
        for iteration in 0..3 {
            let prefix = format!("quadtree_{iteration}_");
            let count = std::fs::read_dir(&dir)
                .unwrap()
                .filter(|entry| {
                    entry
                        .as_ref()
                        .unwrap()
                        .file_name()
                        .to_string_lossy()
                        .starts_with(&prefix)
                })
                .count();
            assert!(count >= 1);
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn abort_before_start_renders_nothing_more() {
        let (scene, camera) = floor_scene();
        let settings = RenderSettings {
            iterations: 12,
            ..small_settings()
        };

        let progress = render(scene, camera, settings, |_, _| {}).unwrap();
        progress.abort();
        let_assert!(Ok(output) = progress.wait());

        assert!(output.image.dimensions() == (16, 12));
    }
}
