use std::io::{self, BufWriter, Write};

use anyhow::{bail, Context, Result};
use log::info;
use lume_mesh::meshfile::{IndexType, MeshFile};
use lume_mesh::{semantic, MappedMeshFile, PrimitiveMode};

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        println!("Usage: lume-meshinfo <input.mesh> > output.obj");
        return Ok(());
    }

    let path = &args[1];
    let mapped = MappedMeshFile::open(path).with_context(|| format!("Failed to open mesh file: {}", path))?;
    let file = mapped.mesh_file()?;

    let header = file.header();
    info!(
        "{}: {} bytes, {} buffers, {} index specs, {} vertex data sets, bounds {:?} .. {:?}",
        path,
        file.len(),
        header.num_buffers,
        header.num_index_specs,
        header.num_vertex_data_sets,
        header.bounds_min,
        header.bounds_max
    );

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    write_obj(&file, path, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Writes every triangle index spec as an OBJ object.
fn write_obj<W: Write>(file: &MeshFile, name: &str, out: &mut W) -> Result<()> {
    writeln!(out, "# Decompiled by lume-meshinfo from {}", name)?;

    // OBJ 索引是全局的，从 1 开始
    let mut vertex_base = 1u32;
    for (i, spec) in file.index_specs()?.iter().enumerate() {
        if PrimitiveMode::from_u32(spec.mode) != Some(PrimitiveMode::Triangles) {
            info!("Index spec {} is not a triangle list, skipped", i);
            continue;
        }
        let index_type = IndexType::from_u32(spec.index_type);
        let data_set = file.vertex_data_set(spec.vertex_data_set)?;
        let num_vertices = data_set.num_vertices;

        let material = spec.material_name();
        writeln!(out, "o {}", if material.is_empty() { format!("mesh{}", i) } else { material })?;

        let mut has_uvs = false;
        let mut has_normals = false;
        for attribute in file.vertex_specs(spec.vertex_data_set)? {
            let keyword = match attribute.semantic {
                semantic::POSITION => "v",
                semantic::NORMAL => {
                    has_normals = true;
                    "vn"
                }
                semantic::TEXTURE_COORDS => {
                    has_uvs = true;
                    "vt"
                }
                other => {
                    info!(
                        "Skipping attribute {}",
                        semantic::name(other).map_or_else(|| format!("{:#010x}", other), str::to_owned)
                    );
                    continue;
                }
            };

            let values = file.read_attribute(&attribute, num_vertices)?;
            for vertex in values.chunks_exact(attribute.components as usize) {
                write!(out, "{}", keyword)?;
                for (c, value) in vertex.iter().enumerate() {
                    // 写入时翻转过 v
                    let value = if keyword == "vt" && c == 1 { 1.0 - value } else { *value };
                    write!(out, " {}", value)?;
                }
                writeln!(out)?;
            }
        }

        let indices = file.read_indices(spec)?;
        if indices.len() % 3 != 0 {
            bail!("Index spec {} has {} indices, not a triangle list ({:?})", i, indices.len(), index_type);
        }
        writeln!(out, "s off")?;
        for triangle in indices.chunks_exact(3) {
            write!(out, "f")?;
            for &index in triangle {
                let v = index as u64 + vertex_base as u64;
                match (has_uvs, has_normals) {
                    (true, true) => write!(out, " {}/{}/{}", v, v, v)?,
                    (true, false) => write!(out, " {}/{}", v, v)?,
                    (false, true) => write!(out, " {}//{}", v, v)?,
                    (false, false) => write!(out, " {}", v)?,
                }
            }
            writeln!(out)?;
        }
        vertex_base = vertex_base
            .checked_add(num_vertices)
            .with_context(|| format!("Too many vertices in {}", name))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;
    use lume_mesh::meshfile::{IndexSpec, VertexDataSetContents};
    use lume_mesh::{parse_obj, MeshFileContents};
    use std::io::Cursor;

    #[test]
    fn decompiles_back_to_obj() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0.25\nf 1/1 2/1 3/1\n";
        let meshes = parse_obj(Cursor::new(obj)).unwrap();
        let mut bytes = Vec::new();
        MeshFileContents::from_mesh_set(&meshes).unwrap().write_to(&mut bytes).unwrap();

        let file = MeshFile::parse(&bytes).unwrap();
        let mut text = Vec::new();
        write_obj(&file, "test", &mut text).unwrap();
        let text = String::from_utf8(text).unwrap();

        assert!(text.contains("o mesh0\n"));
        assert!(text.contains("v 1 0 0\n"));
        assert!(text.contains("vt 0 0.25\n"));
        assert!(text.contains("f 1/1 2/2 3/3\n"));
    }

    #[test]
    fn vertex_count_overflow_is_an_error() {
        let contents = MeshFileContents {
            index_buffers: vec![Vec::<u8>::new().into()],
            index_specs: vec![IndexSpec {
                mode: PrimitiveMode::Triangles as u32,
                index_type: IndexType::UInt16 as u32,
                vertex_data_set: 0,
                ..Zeroable::zeroed()
            }],
            vertex_data_sets: vec![VertexDataSetContents {
                specs: Vec::new(),
                num_vertices: u32::MAX,
            }],
            ..Default::default()
        };
        let mut bytes = Vec::new();
        contents.write_to(&mut bytes).unwrap();

        let file = MeshFile::parse(&bytes).unwrap();
        let mut text = Vec::new();
        assert!(write_obj(&file, "huge", &mut text).is_err());
    }
}
