use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use lume_mesh::processor::MAX_SIZE_VERTEX_CACHE;
use lume_mesh::{load_obj_mesh_set, process_mesh_set, MeshFileContents, MeshSet, ProcessOptions};

/// Compiles OBJ meshes into the binary mesh format.
#[derive(Parser, Debug)]
#[command(name = "lume-meshc", version, about = "Lume mesh compiler")]
struct Args {
    /// Input mesh (.obj)
    input: PathBuf,

    /// Output compiled mesh file
    output: PathBuf,

    /// Mesh scale factor
    #[arg(long, default_value = "1.0")]
    scale: f32,

    /// Material name used for every mesh
    #[arg(long)]
    material: Option<String>,

    /// Enable radiance transfer precomputation
    #[arg(long)]
    prt: bool,

    /// Radiance transfer sphere samples per axis
    #[arg(long, default_value = "32", value_parser = clap::value_parser!(u32).range(1..))]
    prt_samples: u32,

    /// Keep normals as 32 bit floats
    #[arg(long)]
    float_normals: bool,

    /// Simulated vertex cache size used for triangle reordering
    #[arg(long, default_value_t = MAX_SIZE_VERTEX_CACHE)]
    cache_size: usize,
}

impl Args {
    fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            scale: self.scale,
            material: self.material.clone(),
            prt: self.prt,
            prt_samples: self.prt_samples,
            half_normals: !self.float_normals,
            cache_size: self.cache_size,
        }
    }
}

fn load_mesh_set(path: &Path) -> Result<MeshSet> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("obj") => {
            load_obj_mesh_set(path).with_context(|| format!("Failed to load OBJ file: {}", path.display()))
        }
        Some("dae") => bail!("{}: COLLADA input is not supported", path.display()),
        _ => bail!("{}: Unknown format", path.display()),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let start_total = Instant::now();
    let mut meshes = load_mesh_set(&args.input)?;
    info!(
        "Loaded {} meshes from {} in {:.2}s",
        meshes.len(),
        args.input.display(),
        start_total.elapsed().as_secs_f32()
    );

    let process_start = Instant::now();
    process_mesh_set(&mut meshes, &args.process_options())
        .with_context(|| format!("Failed to process {}", args.input.display()))?;
    info!("Processed in {:.2}s", process_start.elapsed().as_secs_f32());

    let save_start = Instant::now();
    let contents = MeshFileContents::from_mesh_set(&meshes)?;
    let written = contents
        .save_to_file(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!(
        "Saved {} bytes to {} in {:.2}s",
        written,
        args.output.display(),
        save_start.elapsed().as_secs_f32()
    );
    info!("Total execution time: {:.2}s", start_total.elapsed().as_secs_f32());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_options() {
        let args = Args::parse_from([
            "lume-meshc",
            "in.obj",
            "out.mesh",
            "--scale",
            "0.5",
            "--material",
            "rock",
            "--prt",
            "--prt-samples",
            "8",
            "--float-normals",
        ]);
        let options = args.process_options();
        assert_eq!(options.scale, 0.5);
        assert_eq!(options.material.as_deref(), Some("rock"));
        assert!(options.prt);
        assert_eq!(options.prt_samples, 8);
        assert!(!options.half_normals);
        assert_eq!(options.cache_size, 32);
    }

    #[test]
    fn defaults() {
        let options = Args::parse_from(["lume-meshc", "a.obj", "b.mesh"]).process_options();
        assert_eq!(options.scale, 1.0);
        assert!(options.material.is_none());
        assert!(!options.prt);
        assert!(options.half_normals);
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let err = load_mesh_set(Path::new("model.fbx")).unwrap_err();
        assert!(err.to_string().contains("Unknown format"));
        assert!(load_mesh_set(Path::new("scene.DAE")).is_err());
    }

    #[test]
    fn zero_samples_are_rejected() {
        assert!(Args::try_parse_from(["lume-meshc", "a.obj", "b.mesh", "--prt-samples", "0"]).is_err());
    }
}
