//! Half-float conversion and attribute precision reduction.

use std::sync::LazyLock;

use log::debug;

use crate::error::MeshResult;
use crate::mesh::{semantic, Attribute, AttributeType, Mesh};

/// Base/shift tables of "Fast Half Float Conversions" (van der Zijp, 2008),
/// indexed by the sign and exponent bits of the f32.
struct HalfTables {
    base: [u16; 512],
    shift: [u8; 512],
}

static HALF_TABLES: LazyLock<HalfTables> = LazyLock::new(|| {
    let mut base = [0u16; 512];
    let mut shift = [0u8; 512];

    for i in 0..256usize {
        let exponent = i as i32 - 127;
        let (b, s): (u16, u8) = if exponent < -24 {
            (0x0000, 24)
        } else if exponent < -14 {
            // 非规格化数
            ((0x0400 >> (-exponent - 14)) as u16, (-exponent - 1) as u8)
        } else if exponent < 16 {
            (((exponent + 15) << 10) as u16, 13)
        } else if exponent < 128 {
            // 溢出为无穷大
            (0x7c00, 24)
        } else {
            // Inf / NaN
            (0x7c00, 13)
        };
        base[i] = b;
        base[i | 0x100] = b | 0x8000;
        shift[i] = s;
        shift[i | 0x100] = s;
    }

    HalfTables { base, shift }
});

/// Truncating f32 to IEEE half conversion.
pub fn float_to_half(value: f32) -> u16 {
    let bits = value.to_bits();
    let index = ((bits >> 23) & 0x1ff) as usize;
    let tables = &*HALF_TABLES;
    tables.base[index] + ((bits & 0x007f_ffff) >> tables.shift[index]) as u16
}

pub fn half_to_float(half: u16) -> f32 {
    let sign = ((half & 0x8000) as u32) << 16;
    let exponent = ((half >> 10) & 0x1f) as u32;
    let mantissa = (half & 0x03ff) as u32;

    let bits = match (exponent, mantissa) {
        (0, 0) => sign,
        (0, m) => {
            // 非规格化数，规格化后再转换
            let shift = m.leading_zeros() - 21;
            let m = (m << shift) & 0x03ff;
            sign | ((113 - shift) << 23) | (m << 13)
        }
        (0x1f, m) => sign | 0x7f80_0000 | (m << 13),
        (e, m) => sign | ((e + 112) << 23) | (m << 13),
    };
    f32::from_bits(bits)
}

fn to_half(attribute: &Attribute) -> Attribute {
    let halves: Vec<u16> = attribute
        .raw_data()
        .chunks_exact(4)
        .map(|c| float_to_half(f32::from_le_bytes([c[0], c[1], c[2], c[3]])))
        .collect();
    Attribute::from_raw(AttributeType::Half, attribute.components(), bytemuck::cast_slice(&halves).to_vec())
}

fn to_int8(attribute: &Attribute) -> Attribute {
    let bytes: Vec<u8> = attribute
        .raw_data()
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as i8 as u8)
        .collect();
    Attribute::from_raw(AttributeType::Int8, attribute.components(), bytes)
}

/// Stores radiance transfer, skin weights and (optionally) normals as half
/// floats and skin joint indices as 8 bit integers. Other attributes, and
/// attributes already in a narrow type, are left alone.
pub fn reduce_precision(mesh: &mut Mesh, half_normals: bool) -> MeshResult<()> {
    let mut to_half_semantics = vec![
        semantic::VERTEX_PRT0,
        semantic::VERTEX_PRT1,
        semantic::VERTEX_PRT2,
        semantic::SKIN_WEIGHTS,
    ];
    if half_normals {
        to_half_semantics.push(semantic::NORMAL);
    }

    let mut replacements = Vec::new();
    for (semantic, attribute) in mesh.attributes() {
        let reduced = match attribute.attribute_type() {
            AttributeType::Float if to_half_semantics.contains(&semantic) => to_half(attribute),
            AttributeType::Int32 if semantic == semantic::SKIN_JOINTS => to_int8(attribute),
            _ => continue,
        };
        replacements.push((semantic, reduced));
    }

    for (semantic, attribute) in replacements {
        debug!(
            "Reduced {} to {:?}",
            semantic::name(semantic).unwrap_or("attribute"),
            attribute.attribute_type()
        );
        mesh.set_attribute_data(semantic, attribute)?;
    }
    Ok(())
}
