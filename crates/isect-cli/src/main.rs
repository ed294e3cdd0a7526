//! isect CLI - trace ray batches against mesh scenes from the terminal.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use isect::{
    Completion, Config, HitRecord, IntersectionApi, MapMode, MeshDesc, RayRecord, HIT_SIZE,
    OCCLUSION_SIZE,
};
use std::fs;
use std::path::{Path, PathBuf};

mod scene_file;

use scene_file::{HitEntry, OcclusionEntry, RayEntry, SceneFile};

#[derive(Parser)]
#[command(name = "isect")]
#[command(about = "Batched ray/scene intersection", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available devices
    Devices,
    /// Trace the tutorial rays at a single triangle and print the hits
    Triangle,
    /// Trace rays from a JSON file against a JSON scene
    Trace {
        /// Scene file with a `meshes` list
        scene: PathBuf,
        /// Ray file: list of {origin, direction, max_t?, mask?}
        rays: PathBuf,
        /// Report occlusion instead of closest hits
        #[arg(long)]
        occlusion: bool,
        /// Device index
        #[arg(short, long, default_value_t = 0)]
        device: usize,
        /// Write results here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Devices => list_devices(&config),
        Commands::Triangle => trace_triangle(config)?,
        Commands::Trace {
            scene,
            rays,
            occlusion,
            device,
            output,
        } => {
            let json = trace_files(config, device, &scene, &rays, occlusion)?;
            match output {
                Some(path) => {
                    fs::write(&path, json)?;
                    println!("Wrote results to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    Ok(Config::from_toml_str(&text)?)
}

fn list_devices(config: &Config) {
    let devices = IntersectionApi::enumerate_devices(config);
    if devices.is_empty() {
        println!("No devices available");
    }
    for (i, device) in devices.iter().enumerate() {
        println!(
            "{i}: {} [{:?}] vendor={} threads={}",
            device.name, device.kind, device.vendor, device.threads
        );
    }
}

fn trace_triangle(config: Config) -> Result<()> {
    let mut api = IntersectionApi::create(0, config)?;

    let vertices = [-1.0, -1.0, 0.0, 1.0, -1.0, 0.0, 0.0, 1.0, 0.0];
    let shape = api.create_mesh(&MeshDesc::triangles(&vertices, &[0, 1, 2]))?;
    api.attach_shape(shape)?;
    api.commit()?;

    let rays = [
        RayRecord::new([0.0, 0.0, -1.0], [0.0, 0.0, 10.0], 1000.0),
        RayRecord::new([0.0, 0.5, -10.0], [0.0, 0.0, 1.0], 1000.0),
        RayRecord::new([0.4, 0.0, -10.0], [0.0, 0.0, 1.0], 1000.0),
        RayRecord::new([5.0, 5.0, -10.0], [0.0, 0.0, 1.0], 1000.0),
    ];
    let hits = run_intersection(&mut api, &rays)?;
    for (i, hit) in hits.iter().enumerate() {
        if hit.is_hit() {
            println!(
                "ray {i}: hit shape {} prim {} at t={} (u={}, v={})",
                hit.shape_id,
                hit.prim_id,
                hit.t(),
                hit.u(),
                hit.v()
            );
        } else {
            println!("ray {i}: miss");
        }
    }
    log::debug!("{} shape(s) attached", api.attached_shape_count());
    Ok(())
}

fn trace_files(
    config: Config,
    device: usize,
    scene_path: &Path,
    rays_path: &Path,
    occlusion: bool,
) -> Result<String> {
    let scene: SceneFile = serde_json::from_str(
        &fs::read_to_string(scene_path)
            .with_context(|| format!("failed to read scene {}", scene_path.display()))?,
    )
    .with_context(|| format!("invalid scene file {}", scene_path.display()))?;
    let rays: Vec<RayEntry> = serde_json::from_str(
        &fs::read_to_string(rays_path)
            .with_context(|| format!("failed to read rays {}", rays_path.display()))?,
    )
    .with_context(|| format!("invalid ray file {}", rays_path.display()))?;

    let mut api = IntersectionApi::create(device, config)?;
    for (i, mesh) in scene.meshes.iter().enumerate() {
        let shape = api
            .create_mesh(&MeshDesc {
                vertices: &mesh.vertices,
                vertex_count: mesh.vertices.len() / 3,
                vertex_stride: 3 * std::mem::size_of::<f32>(),
                indices: &mesh.indices,
                index_offset: 0,
                face_vertex_counts: mesh.face_vertex_counts.as_deref(),
                face_count: mesh.face_count(),
            })
            .with_context(|| format!("mesh {i}"))?;
        if let Some(id) = mesh.id {
            api.set_shape_id(shape, id)?;
        }
        if let Some(mask) = mesh.mask {
            api.set_shape_mask(shape, mask)?;
        }
        api.attach_shape(shape)?;
    }
    api.commit()?;
    log::info!("tracing {} rays against {} meshes", rays.len(), scene.meshes.len());

    let records: Vec<RayRecord> = rays.iter().map(RayRecord::from).collect();
    if records.is_empty() {
        return Ok("[]".to_string());
    }

    let json = if occlusion {
        let results = run_occlusion(&mut api, &records)?;
        let entries: Vec<OcclusionEntry> = results
            .iter()
            .enumerate()
            .map(|(ray, &r)| OcclusionEntry {
                ray,
                occluded: r != isect::NULL_ID,
            })
            .collect();
        serde_json::to_string_pretty(&entries)?
    } else {
        let hits = run_intersection(&mut api, &records)?;
        let entries: Vec<HitEntry> = hits
            .iter()
            .enumerate()
            .map(|(ray, hit)| HitEntry::new(ray, hit))
            .collect();
        serde_json::to_string_pretty(&entries)?
    };
    Ok(json)
}

fn run_intersection(api: &mut IntersectionApi, rays: &[RayRecord]) -> Result<Vec<HitRecord>> {
    let ray_buffer = api.create_buffer_from(rays)?;
    let hit_buffer = api.create_buffer(rays.len() * HIT_SIZE, None)?;
    api.query_intersection(ray_buffer, rays.len(), hit_buffer, None, Completion::Blocking)?;
    read_buffer(api, hit_buffer, rays.len() * HIT_SIZE)
}

fn run_occlusion(api: &mut IntersectionApi, rays: &[RayRecord]) -> Result<Vec<i32>> {
    let ray_buffer = api.create_buffer_from(rays)?;
    let out_buffer = api.create_buffer(rays.len() * OCCLUSION_SIZE, None)?;
    api.query_occlusion(ray_buffer, rays.len(), out_buffer, None, Completion::Blocking)?;
    read_buffer(api, out_buffer, rays.len() * OCCLUSION_SIZE)
}

fn read_buffer<T: bytemuck::Pod>(
    api: &mut IntersectionApi,
    buffer: isect::BufferHandle,
    size: usize,
) -> Result<Vec<T>> {
    let (mapping, ready) = api.map_buffer(buffer, MapMode::Read, 0, size)?;
    api.wait_event(ready)?;
    let records = mapping.read_records::<T>()?;
    api.unmap_buffer(mapping)?;
    api.delete_event(ready)?;
    Ok(records)
}
