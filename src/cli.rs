use std::path::PathBuf;

use anyhow::{Context as _, bail};
use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::Unit;
use pathguide::{
    Camera, RenderSettings, Rgb, Scene,
    geometry::{ScreenSize, WorldVector},
    render,
    scene::{Environment, Material, Mesh, Sun, triangle_bvh::TriangleBvh},
};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: pathguide-cli <mesh.obj> [output.png] [snapshot dir]";

struct Args {
    mesh: PathBuf,
    output: PathBuf,
    snapshot_dir: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args_os().skip(1);
    let Some(mesh) = args.next() else {
        bail!(USAGE);
    };
    let output = args.next().unwrap_or_else(|| "render.png".into());
    let snapshot_dir = args.next().map(PathBuf::from);
    if args.next().is_some() {
        bail!(USAGE);
    }

    Ok(Args {
        mesh: mesh.into(),
        output: output.into(),
        snapshot_dir,
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;

    let mesh = Mesh::with_obj(&args.mesh)
        .with_context(|| format!("Failed to load mesh {}", args.mesh.display()))?;
    let Some(bounds) = mesh.bounding_box() else {
        bail!("Mesh {} contains no triangles", args.mesh.display());
    };
    let object = TriangleBvh::new(&mesh);
    object.log_statistics();

    // Three quarters view from the -Y side, Z is up
    let size = bounds.size().max();
    let target = bounds.center();
    let camera = Camera::builder()
        .center(target + WorldVector::new(0.6, -2.0, 0.9) * size)
        .target(target)
        .up(WorldVector::new(0.0, 0.0, 1.0))
        .resolution(ScreenSize::new(640, 480))
        .build();

    let scene = Scene {
        object,
        material: Material::Diffuse {
            albedo: Rgb::new(0.8, 0.8, 0.8),
        },
        environment: Environment::Sky {
            zenith: Rgb::new(0.35, 0.55, 1.0),
            horizon: Rgb::new(1.0, 1.0, 1.0),
            sun: Some(Sun {
                direction: Unit::new_normalize(WorldVector::new(0.3, -0.4, 0.85)),
                cos_radius: 0.9988,
                radiance: Rgb::new(150.0, 140.0, 120.0),
            }),
        },
    };

    let settings = RenderSettings::builder()
        .iterations(7)
        .maybe_snapshot_dir(args.snapshot_dir)
        .build();

    let bar = ProgressBar::new(1000).with_style(ProgressStyle::with_template(
        "{bar:40} {percent}% {msg} [{elapsed_precise}]",
    )?);
    let render_progress = render(scene, camera, settings, {
        let bar = bar.clone();
        move |_, progress| {
            bar.set_message(format!(
                "iteration {}/{}",
                progress.iteration + 1,
                progress.iterations
            ));
            bar.set_position((progress.fraction() * 1000.0) as u64);
        }
    })?;

    let output = render_progress.wait()?;
    bar.finish();

    tracing::info!(statistics = %output.guiding_statistics, "guiding structure");
    output
        .image
        .save(&args.output)
        .with_context(|| format!("Failed to save image to {}", args.output.display()))?;
    tracing::info!(path = %args.output.display(), "image saved");

    Ok(())
}
