//! Forsyth vertex scoring.

/// Simulated post-transform cache capacity.
pub const MAX_SIZE_VERTEX_CACHE: usize = 32;

pub const CACHE_DECAY_POWER: f32 = 1.5;
pub const LAST_TRI_SCORE: f32 = 0.75;
pub const VALENCE_BOOST_SCALE: f32 = 2.0;
pub const VALENCE_BOOST_POWER: f32 = 0.5;

/// Score of a vertex given its position in the simulated cache (-1 if not
/// cached) and the number of triangles still waiting for it.
pub fn vertex_score(cache_position: i32, num_unadded_references: u32, capacity: usize) -> f32 {
    if num_unadded_references < 1 {
        return -1.0;
    }

    let mut score = 0.0;
    if cache_position >= 0 {
        if cache_position < 3 {
            // 上一个三角形的三个顶点得分相同，与顺序无关
            score = LAST_TRI_SCORE;
        } else {
            debug_assert!((cache_position as usize) < capacity, "cache position out of range");
            let scaler = 1.0 / (capacity - 3) as f32;
            score = (1.0 - (cache_position - 3) as f32 * scaler).powf(CACHE_DECAY_POWER);
        }
    }

    score + VALENCE_BOOST_SCALE * (num_unadded_references as f32).powf(-VALENCE_BOOST_POWER)
}
