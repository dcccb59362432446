//! Diffuse precomputed radiance transfer projected onto three bands of real
//! spherical harmonics, stored as `VERTEX_PRT0..2`.

use std::f64::consts::PI;

use glam::{DVec3, Vec3};
use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{MeshError, MeshResult};
use crate::mesh::{semantic, Mesh, PrimitiveMode};

pub const SH_BANDS: i32 = 3;
pub const SH_COEFFS: usize = (SH_BANDS * SH_BANDS) as usize;

/// Hits closer than this count as the surface itself.
const SELF_HIT_DISTANCE: f32 = 0.01;
const SAMPLE_SEED: u64 = 0x5eed_0f_5a3;

#[derive(Clone, Debug)]
pub struct ShSample {
    pub theta: f64,
    pub phi: f64,
    pub direction: DVec3,
    /// Indexed by `l * (l + 1) + m`
    pub coeffs: [f64; SH_COEFFS],
}

fn factorial(x: i32) -> f64 {
    (1..=x).map(f64::from).product()
}

/// Associated Legendre polynomial for `l <= 2`, `0 <= m <= l`.
fn legendre(l: i32, m: i32, x: f64) -> f64 {
    let s = (1.0 - x * x).max(0.0).sqrt();
    match (l, m) {
        (0, 0) => 1.0,
        (1, 0) => x,
        (1, 1) => -s,
        (2, 0) => 0.5 * (3.0 * x * x - 1.0),
        (2, 1) => -3.0 * x * s,
        (2, 2) => 3.0 * (1.0 - x * x),
        _ => unreachable!("legendre({}, {}) outside three bands", l, m),
    }
}

fn renormalisation(l: i32, m: i32) -> f64 {
    ((factorial(l - m) * (2.0 * l as f64 + 1.0)) / (factorial(l + m) * 4.0 * PI)).sqrt()
}

/// Real spherical harmonic `Y_l^m(theta, phi)`.
pub fn spherical_harmonic(l: i32, m: i32, theta: f64, phi: f64) -> f64 {
    let x = theta.cos();
    match m {
        0 => renormalisation(l, 0) * legendre(l, 0, x),
        m if m > 0 => {
            2f64.sqrt() * renormalisation(l, m) * (m as f64 * phi).cos() * legendre(l, m, x)
        }
        m => 2f64.sqrt() * renormalisation(l, -m) * (-m as f64 * phi).sin() * legendre(l, -m, x),
    }
}

/// `samples_per_axis²` stratified, jittered directions on the unit sphere.
/// The jitter comes from a fixed seed, so the set is the same on every run.
pub fn setup_spherical_samples(samples_per_axis: u32) -> Vec<ShSample> {
    let mut rng = ChaCha8Rng::seed_from_u64(SAMPLE_SEED);
    let n = samples_per_axis as usize;
    let inv = 1.0 / samples_per_axis as f64;
    let mut samples = Vec::with_capacity(n * n);

    for i in 0..samples_per_axis {
        for j in 0..samples_per_axis {
            let u = i as f64 + rng.gen_range(0.0..1.0);
            let v = j as f64 + rng.gen_range(0.0..1.0);
            let theta = 2.0 * (1.0 - u * inv).sqrt().acos();
            let phi = 2.0 * PI * v * inv;

            let mut coeffs = [0.0; SH_COEFFS];
            for l in 0..SH_BANDS {
                for m in -l..=l {
                    coeffs[(l * (l + 1) + m) as usize] = spherical_harmonic(l, m, theta, phi);
                }
            }

            samples.push(ShSample {
                theta,
                phi,
                direction: DVec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos()),
                coeffs,
            });
        }
    }
    samples
}

fn normals(mesh: &Mesh) -> MeshResult<Vec<Vec3>> {
    let attribute = mesh
        .attribute(semantic::NORMAL)
        .ok_or_else(|| MeshError::MalformedInput("radiance transfer needs vertex normals".into()))?;
    Ok(attribute
        .to_elements::<[f32; 3]>()?
        .into_iter()
        .map(Vec3::from_array)
        .collect())
}

fn store_transfer(mesh: &mut Mesh, transfer: &[[f64; SH_COEFFS]], num_samples: usize) -> MeshResult<()> {
    let factor = 4.0 * PI / num_samples as f64;
    let band = |offset: usize| -> Vec<[f32; 3]> {
        transfer
            .iter()
            .map(|c| {
                [
                    (c[offset] * factor) as f32,
                    (c[offset + 1] * factor) as f32,
                    (c[offset + 2] * factor) as f32,
                ]
            })
            .collect()
    };

    mesh.set_attribute(semantic::VERTEX_PRT0, &band(0))?;
    mesh.set_attribute(semantic::VERTEX_PRT1, &band(3))?;
    mesh.set_attribute(semantic::VERTEX_PRT2, &band(6))?;
    Ok(())
}

fn check_samples(samples: &[ShSample]) -> MeshResult<()> {
    if samples.is_empty() {
        return Err(MeshError::MalformedInput("radiance transfer needs at least one sample".into()));
    }
    Ok(())
}

/// Cosine-free visibility of the upper hemisphere, no occlusion. The normal
/// attribute is removed afterwards.
pub fn calculate_diffuse_unshadowed(mesh: &mut Mesh, samples: &[ShSample]) -> MeshResult<()> {
    check_samples(samples)?;
    let normals = normals(mesh)?;

    let transfer: Vec<[f64; SH_COEFFS]> = normals
        .iter()
        .map(|n| {
            let normal = n.as_dvec3();
            let mut coeffs = [0.0; SH_COEFFS];
            for sample in samples.iter().filter(|s| normal.dot(s.direction) > 0.0) {
                for (c, s) in coeffs.iter_mut().zip(&sample.coeffs) {
                    *c += s;
                }
            }
            coeffs
        })
        .collect();

    store_transfer(mesh, &transfer, samples.len())?;
    mesh.remove_attribute(semantic::NORMAL);
    Ok(())
}

/// Möller–Trumbore, both faces. Returns the ray parameter of the hit.
fn intersect_triangle(origin: Vec3, direction: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let edge1 = b - a;
    let edge2 = c - a;
    let h = direction.cross(edge2);
    let det = edge1.dot(h);
    if det.abs() < 1e-8 {
        return None;
    }

    let f = 1.0 / det;
    let s = origin - a;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    Some(f * edge2.dot(q))
}

/// Like [`calculate_diffuse_unshadowed`] but directions blocked by the mesh
/// itself do not contribute. Keeps the normal attribute.
pub fn calculate_diffuse_shadowed(mesh: &mut Mesh, samples: &[ShSample]) -> MeshResult<()> {
    check_samples(samples)?;
    if mesh.mode() != PrimitiveMode::Triangles || mesh.indices().len() % 3 != 0 {
        return Err(MeshError::MalformedInput(
            "shadowed radiance transfer needs a triangle list".into(),
        ));
    }
    let normals = normals(mesh)?;
    let positions = mesh.positions()?;
    if let Some(&bad) = mesh.indices().iter().find(|&&i| i as usize >= positions.len()) {
        return Err(MeshError::IndexOutOfRange {
            stream: "mesh indices",
            index: bad,
            count: positions.len(),
        });
    }
    let triangles: Vec<[Vec3; 3]> = mesh
        .indices()
        .chunks_exact(3)
        .map(|t| [positions[t[0] as usize], positions[t[1] as usize], positions[t[2] as usize]])
        .collect();

    let occluded = |origin: Vec3, direction: Vec3| {
        triangles.iter().any(|[a, b, c]| {
            intersect_triangle(origin, direction, *a, *b, *c).is_some_and(|t| t > SELF_HIT_DISTANCE)
        })
    };

    let transfer: Vec<[f64; SH_COEFFS]> = normals
        .iter()
        .zip(&positions)
        .map(|(n, &origin)| {
            let normal = n.as_dvec3();
            let mut coeffs = [0.0; SH_COEFFS];
            for sample in samples {
                if normal.dot(sample.direction) < 0.0 || occluded(origin, sample.direction.as_vec3()) {
                    continue;
                }
                for (c, s) in coeffs.iter_mut().zip(&sample.coeffs) {
                    *c += s;
                }
            }
            coeffs
        })
        .collect();

    debug!(
        "Shadowed transfer: {} vertices, {} triangles, {} samples",
        positions.len(),
        triangles.len(),
        samples.len()
    );
    store_transfer(mesh, &transfer, samples.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const Y00: f64 = 0.282_094_791_773_878_1;

    fn floor_triangle() -> Mesh {
        let mut mesh = Mesh::new(3);
        mesh.set_attribute(semantic::POSITION, &[[0.0f32, 0.0, 0.0], [0.5, 0.0, 0.0], [0.0, 0.5, 0.0]])
            .unwrap();
        mesh.set_attribute(semantic::NORMAL, &[[0.0f32, 0.0, 1.0]; 3]).unwrap();
        mesh.set_indices(vec![0, 1, 2]);
        mesh
    }

    fn prt(mesh: &Mesh, semantic: u32) -> Vec<[f32; 3]> {
        mesh.attribute(semantic).unwrap().to_elements().unwrap()
    }

    #[test]
    fn samples_cover_the_sphere() {
        let samples = setup_spherical_samples(16);
        assert_eq!(samples.len(), 256);
        for s in &samples {
            assert!((s.direction.length() - 1.0).abs() < 1e-9);
            assert!((s.coeffs[0] - Y00).abs() < 1e-12);
        }

        let upper = samples.iter().filter(|s| s.direction.z > 0.0).count();
        assert_eq!(upper, 128);

        let again = setup_spherical_samples(16);
        assert_eq!(samples[37].coeffs, again[37].coeffs);
    }

    #[test]
    fn harmonics_match_closed_forms() {
        let (theta, phi) = (0.7f64, 2.1f64);
        let (x, y, z) = (theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
        let c1 = (3.0 / (4.0 * PI)).sqrt();
        assert!((spherical_harmonic(1, 0, theta, phi) - c1 * z).abs() < 1e-12);
        assert!((spherical_harmonic(1, 1, theta, phi) + c1 * x).abs() < 1e-12);
        assert!((spherical_harmonic(1, -1, theta, phi) + c1 * y).abs() < 1e-12);

        let c2 = 0.5 * (15.0 / PI).sqrt();
        assert!((spherical_harmonic(2, -2, theta, phi) - c2 * x * y).abs() < 1e-12);
    }

    #[test]
    fn unshadowed_transfer_integrates_the_hemisphere() {
        let mut mesh = floor_triangle();
        let samples = setup_spherical_samples(30);
        calculate_diffuse_unshadowed(&mut mesh, &samples).unwrap();

        assert!(mesh.attribute(semantic::NORMAL).is_none());
        let band0 = prt(&mesh, semantic::VERTEX_PRT0);
        let band1 = prt(&mesh, semantic::VERTEX_PRT1);
        assert_eq!(band0.len(), 3);

        // ∫ Y00 over the upper hemisphere = 2π Y00
        let expected = 2.0 * PI * Y00;
        assert!((band0[0][0] as f64 - expected).abs() < 0.05, "{:?}", band0[0]);
        // ∫ Y10 over the upper hemisphere = π sqrt(3 / 4π)
        let expected_z = PI * (3.0 / (4.0 * PI)).sqrt();
        assert!((band0[0][2] as f64 - expected_z).abs() < 0.05, "{:?}", band0[0]);
        assert_ne!(band0, band1);
    }

    #[test]
    fn open_surfaces_are_not_shadowed() {
        let samples = setup_spherical_samples(12);
        let mut open = floor_triangle();
        calculate_diffuse_shadowed(&mut open, &samples).unwrap();
        assert!(open.attribute(semantic::NORMAL).is_some());

        let mut reference = floor_triangle();
        calculate_diffuse_unshadowed(&mut reference, &samples).unwrap();

        for s in [semantic::VERTEX_PRT0, semantic::VERTEX_PRT1, semantic::VERTEX_PRT2] {
            for (a, b) in prt(&open, s).iter().zip(prt(&reference, s).iter()) {
                for k in 0..3 {
                    assert!((a[k] - b[k]).abs() < 1e-5);
                }
            }
        }
    }

    #[test]
    fn a_roof_blocks_the_sky() {
        let mut mesh = Mesh::new(7);
        mesh.set_attribute(
            semantic::POSITION,
            &[
                [0.0f32, 0.0, 0.0],
                [0.5, 0.0, 0.0],
                [0.0, 0.5, 0.0],
                [-100.0, -100.0, 1.0],
                [100.0, -100.0, 1.0],
                [100.0, 100.0, 1.0],
                [-100.0, 100.0, 1.0],
            ],
        )
        .unwrap();
        let mut normals = vec![[0.0f32, 0.0, 1.0]; 3];
        normals.extend([[0.0f32, 0.0, -1.0]; 4]);
        mesh.set_attribute(semantic::NORMAL, &normals).unwrap();
        mesh.set_indices(vec![0, 1, 2, 3, 4, 5, 3, 5, 6]);

        let samples = setup_spherical_samples(12);
        calculate_diffuse_shadowed(&mut mesh, &samples).unwrap();

        let band0 = prt(&mesh, semantic::VERTEX_PRT0);
        let open_sky = 2.0 * PI * Y00;
        assert!((band0[0][0] as f64) < 0.1 * open_sky, "{:?}", band0[0]);
        // 屋顶朝下的一面看到的是地面三角形以外的空间
        assert!((band0[5][0] as f64) > 0.5 * open_sky, "{:?}", band0[5]);
    }

    #[test]
    fn normals_are_required() {
        let mut mesh = Mesh::new(1);
        mesh.set_attribute(semantic::POSITION, &[[0.0f32; 3]]).unwrap();
        let samples = setup_spherical_samples(2);
        assert!(calculate_diffuse_unshadowed(&mut mesh, &samples).is_err());
        assert!(calculate_diffuse_shadowed(&mut mesh, &samples).is_err());
        assert!(calculate_diffuse_unshadowed(&mut floor_triangle(), &[]).is_err());
    }
}
