//! RAM estimates used for cache accounting
//!
//! The numbers approximate the footprint of the cache's bookkeeping; they are
//! only required to be consistent, so that the maintained total always equals
//! the sum recomputed from the cached entries.

use std::mem;

use segindex::DocSet;

use crate::key::CacheQuery;

/// Size of a pointer
pub const NUM_BYTES_OBJECT_REF: usize = mem::size_of::<usize>();

/// Estimate for a query that does not report its own footprint
pub const QUERY_DEFAULT_RAM_BYTES_USED: usize = 192;

/// One hash table slot: key and value references, with 2x load headroom
pub const HASHTABLE_RAM_BYTES_PER_ENTRY: usize = 2 * NUM_BYTES_OBJECT_REF * 2;

/// One slot of a hash table that also keeps recency links
pub const LINKED_HASHTABLE_RAM_BYTES_PER_ENTRY: usize =
    HASHTABLE_RAM_BYTES_PER_ENTRY + 2 * NUM_BYTES_OBJECT_REF;

/// Cost of one (segment, query) entry: its slot in the segment table plus the set
pub fn doc_set_cost(set: &DocSet) -> usize {
    HASHTABLE_RAM_BYTES_PER_ENTRY + set.ram_bytes_used()
}

/// Cost of a query's presence in the recency index
pub fn query_cost<Q: CacheQuery>(query: &Q) -> usize {
    LINKED_HASHTABLE_RAM_BYTES_PER_ENTRY + query.ram_bytes_used()
}

/// Cost of a segment owning a table
pub const fn segment_table_cost() -> usize {
    HASHTABLE_RAM_BYTES_PER_ENTRY
}
