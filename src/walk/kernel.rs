use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::graph::record::RecordView;
use crate::graph::types::VertexId;

/// RNG stream for one compute shard (or stream 0 for seeding). All
/// streams derive from the run seed, so a fixed seed and thread count
/// replay the same draw sequences.
pub fn rng_stream(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

/// One state transition of a walk sitting on the vertex whose record
/// is `record`: with probability `1 - alpha` move to a uniform random
/// out-neighbor, with probability `alpha` (or always, from a sink)
/// restart at a uniform random vertex.
///
/// The draw discipline is fixed: one `f32` for the restart test, then
/// exactly one index draw. Replays depend on it.
pub fn choose_next(
    rng: &mut ChaCha8Rng,
    alpha: f32,
    record: &RecordView<'_>,
    nvertices: VertexId,
) -> VertexId {
    let restart = rng.gen_range(0.0f32..1.0) < alpha;
    let degree = record.out_degree();
    if !restart && degree > 0 {
        record.neighbor(rng.gen_range(0..degree))
    } else {
        rng.gen_range(0..nvertices)
    }
}
