pub mod precision;
pub mod prt;
pub mod unify;
pub mod vcache;

use std::time::Instant;

use log::{debug, info};

use crate::error::MeshResult;
use crate::mesh::{MeshSet, PrimitiveMode};

pub use precision::{float_to_half, half_to_float, reduce_precision};
pub use prt::{calculate_diffuse_shadowed, calculate_diffuse_unshadowed, setup_spherical_samples};
pub use unify::{separate_to_unified, AttributeStream, Unified};
pub use vcache::{optimize_triangle_ordering, optimize_triangle_ordering_with_cache, MAX_SIZE_VERTEX_CACHE};

/// Knobs of [`process_mesh_set`].
#[derive(Clone, Debug)]
pub struct ProcessOptions {
    /// Uniform position scale, skipped when 1
    pub scale: f32,
    /// Replaces the material of every mesh
    pub material: Option<String>,
    /// Bake shadowed radiance transfer
    pub prt: bool,
    /// Sphere samples per axis, `prt_samples²` rays per vertex
    pub prt_samples: u32,
    pub half_normals: bool,
    pub cache_size: usize,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            material: None,
            prt: false,
            prt_samples: 32,
            half_normals: true,
            cache_size: MAX_SIZE_VERTEX_CACHE,
        }
    }
}

/// Average cache miss ratio of a triangle list on a FIFO cache.
pub fn acmr(indices: &[u32], num_vertices: usize, cache_size: usize) -> f32 {
    if indices.is_empty() || num_vertices == 0 {
        return 0.0;
    }
    meshopt::analyze_vertex_cache(indices, num_vertices, cache_size as u32, 0, 0).acmr
}

/// Runs the compile stages on every mesh: material override, scale,
/// radiance transfer, precision reduction and triangle reordering.
pub fn process_mesh_set(meshes: &mut MeshSet, options: &ProcessOptions) -> MeshResult<()> {
    if let Some(material) = &options.material {
        for mesh in meshes.iter_mut() {
            mesh.set_material(material.as_str());
        }
    }

    if options.scale != 1.0 {
        for mesh in meshes.iter_mut() {
            mesh.scale_positions(options.scale)?;
        }
    }

    if options.prt {
        let start = Instant::now();
        let samples = setup_spherical_samples(options.prt_samples);
        for mesh in meshes.iter_mut() {
            calculate_diffuse_shadowed(mesh, &samples)?;
        }
        info!(
            "Radiance transfer with {} samples in {:.2}s",
            samples.len(),
            start.elapsed().as_secs_f32()
        );
    }

    for mesh in meshes.iter_mut() {
        reduce_precision(mesh, options.half_normals)?;
    }

    let start = Instant::now();
    for (i, mesh) in meshes.iter_mut().enumerate() {
        if mesh.mode() != PrimitiveMode::Triangles {
            debug!("Mesh {} is {:?}, keeping its order", i, mesh.mode());
            continue;
        }

        let num_vertices = mesh.num_vertices() as usize;
        let before = acmr(mesh.indices(), num_vertices, options.cache_size);
        let optimized = optimize_triangle_ordering_with_cache(num_vertices, mesh.indices(), options.cache_size)?;
        let after = acmr(&optimized, num_vertices, options.cache_size);
        mesh.set_indices(optimized);

        info!(
            "Mesh {} '{}': {} triangles, ACMR {:.3} -> {:.3}",
            i,
            mesh.material(),
            mesh.indices().len() / 3,
            before,
            after
        );
    }
    debug!("Triangle reordering in {:.2}s", start.elapsed().as_secs_f32());

    Ok(())
}
