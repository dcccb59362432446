//! Wavefront OBJ import through `tobj`.
//!
//! Faces keep their separate position/normal/texcoord indices and are merged
//! by [`separate_to_unified`], one [`Mesh`] per OBJ object or group.

use std::io::BufRead;
use std::path::Path;

use log::{debug, warn};

use crate::error::{MeshError, MeshResult};
use crate::mesh::{semantic, Mesh, MeshSet};
use crate::processor::unify::{separate_to_unified, AttributeStream};

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        single_index: false,
        triangulate: true,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

pub fn load_obj_mesh_set<P: AsRef<Path>>(path: P) -> MeshResult<MeshSet> {
    let (models, materials) = tobj::load_obj(path.as_ref(), &load_options())?;
    build_mesh_set(&models, materials)
}

/// Parses OBJ text. `mtllib` statements cannot be resolved, so material
/// names stay empty.
pub fn parse_obj<R: BufRead>(mut reader: R) -> MeshResult<MeshSet> {
    let (models, materials) = tobj::load_obj_buf(&mut reader, &load_options(), |_| {
        Err(tobj::LoadError::OpenFileFailed)
    })?;
    build_mesh_set(&models, materials)
}

fn build_mesh_set(
    models: &[tobj::Model],
    materials: Result<Vec<tobj::Material>, tobj::LoadError>,
) -> MeshResult<MeshSet> {
    let materials = materials.unwrap_or_else(|e| {
        warn!("Materials not loaded: {}", e);
        Vec::new()
    });

    let mut meshes = MeshSet::new();
    for model in models {
        if model.mesh.indices.is_empty() {
            debug!("Skipping '{}': no faces", model.name);
            continue;
        }

        let mut mesh = model_to_mesh(&model.mesh)?;
        if let Some(material) = model.mesh.material_id.and_then(|id| materials.get(id)) {
            mesh.set_material(material.name.as_str());
        }
        debug!(
            "'{}': {} corners -> {} vertices",
            model.name,
            model.mesh.indices.len(),
            mesh.num_vertices()
        );
        meshes.push(mesh);
    }

    if meshes.is_empty() {
        return Err(MeshError::MalformedInput("OBJ file contains no faces".into()));
    }
    Ok(meshes)
}

fn model_to_mesh(obj: &tobj::Mesh) -> MeshResult<Mesh> {
    let positions: Vec<[f32; 3]> = obj.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect();
    let normals: Vec<[f32; 3]> = obj.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]).collect();
    // OBJ 的 v 轴朝上
    let uvs: Vec<[f32; 2]> = obj.texcoords.chunks_exact(2).map(|t| [t[0], 1.0 - t[1]]).collect();

    let has_normals = !obj.normal_indices.is_empty();
    let has_uvs = !obj.texcoord_indices.is_empty();

    let unified = separate_to_unified(
        obj.indices.len(),
        Some(AttributeStream::new(&obj.indices, &positions)),
        has_normals.then(|| AttributeStream::new(&obj.normal_indices, &normals)),
        has_uvs.then(|| AttributeStream::new(&obj.texcoord_indices, &uvs)),
    )?;

    let mut mesh = Mesh::new(unified.num_vertices as u32);
    mesh.set_attribute(semantic::POSITION, &unified.values0)?;
    if has_normals {
        mesh.set_attribute(semantic::NORMAL, &unified.values1)?;
    }
    if has_uvs {
        mesh.set_attribute(semantic::TEXTURE_COORDS, &unified.values2)?;
    }
    mesh.set_indices(unified.indices);
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CUBE_FACE: &str = "\
o face
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vn 0 0 1
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn quad_is_triangulated_and_unified() {
        let meshes = parse_obj(Cursor::new(CUBE_FACE)).unwrap();
        assert_eq!(meshes.len(), 1);

        let mesh = &meshes[0];
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.indices(), &[0, 1, 2, 0, 2, 3]);

        let uvs: Vec<[f32; 2]> = mesh.attribute(semantic::TEXTURE_COORDS).unwrap().to_elements().unwrap();
        assert_eq!(uvs[0], [0.0, 1.0]);
        assert_eq!(uvs[2], [1.0, 0.0]);

        let normals: Vec<[f32; 3]> = mesh.attribute(semantic::NORMAL).unwrap().to_elements().unwrap();
        assert!(normals.iter().all(|n| *n == [0.0, 0.0, 1.0]));
    }

    #[test]
    fn corners_with_different_normals_are_split() {
        let obj = "\
v 0 0 0
v 1 0 0
v 0 1 0
v 0 0 1
vn 0 0 1
vn 1 0 0
f 1//1 2//1 3//1
f 1//2 3//2 4//2
";
        let meshes = parse_obj(Cursor::new(obj)).unwrap();
        let mesh = &meshes[0];
        // 顶点 1 和 3 各有两条法线
        assert_eq!(mesh.num_vertices(), 6);
        assert_eq!(mesh.indices(), &[0, 1, 2, 3, 4, 5]);
        assert!(mesh.attribute(semantic::TEXTURE_COORDS).is_none());
    }

    #[test]
    fn positions_only() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\nf 1 2 3\nf 3 2 4\n";
        let meshes = parse_obj(Cursor::new(obj)).unwrap();
        let mesh = &meshes[0];
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.indices(), &[0, 1, 2, 2, 1, 3]);
        assert_eq!(mesh.attributes().count(), 1);
    }

    #[test]
    fn groups_become_meshes() {
        let obj = "\
v 0 0 0
v 1 0 0
v 0 1 0
v 1 1 0
o first
f 1 2 3
o second
f 2 4 3
";
        let meshes = parse_obj(Cursor::new(obj)).unwrap();
        assert_eq!(meshes.len(), 2);
        assert!(meshes.iter().all(|m| m.num_vertices() == 3));
    }

    #[test]
    fn no_faces_is_an_error() {
        assert!(matches!(
            parse_obj(Cursor::new("v 0 0 0\n")),
            Err(MeshError::MalformedInput(_))
        ));
    }
}
