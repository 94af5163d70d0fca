/// Dense vertex identifier in `[0, V)`.
pub type VertexId = u32;

/// Index of an on-disk adjacency block.
pub type BlockId = u32;

/// `block_of` is one byte per vertex, so a graph partitions into at
/// most this many blocks.
pub const MAX_BLOCKS: usize = 256;
