//! Document sets
//!
//! A [`DocSet`] is the boolean membership of one segment's documents in a
//! query's result. Dense results are stored as a bitset, sparse ones as a
//! sorted array; [`DocSetBuilder`] picks the representation from a cost hint.

use std::mem;
use std::sync::Arc;

use crate::weight::DocIdIterator;

const BITS_PER_WORD: u32 = 64;

/// Immutable set of segment-local doc ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocSet {
    /// No documents
    Empty,
    /// One bit per document of the segment
    Bits {
        /// Bit words, doc `d` is bit `d % 64` of word `d / 64`
        words: Box<[u64]>,
        /// Number of set bits
        len: usize,
    },
    /// Sorted, deduplicated doc ids
    Sparse(Box<[u32]>),
}

impl DocSet {
    /// Build a sparse set from sorted, deduplicated doc ids
    pub fn from_sorted(docs: Vec<u32>) -> Self {
        if docs.is_empty() {
            DocSet::Empty
        } else {
            DocSet::Sparse(docs.into_boxed_slice())
        }
    }

    /// Number of documents in the set
    pub fn len(&self) -> usize {
        match self {
            DocSet::Empty => 0,
            DocSet::Bits { len, .. } => *len,
            DocSet::Sparse(docs) => docs.len(),
        }
    }

    /// Whether the set has no documents
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Membership test
    pub fn contains(&self, doc: u32) -> bool {
        match self {
            DocSet::Empty => false,
            DocSet::Bits { words, .. } => words
                .get((doc / BITS_PER_WORD) as usize)
                .map_or(false, |word| word & (1 << (doc % BITS_PER_WORD)) != 0),
            DocSet::Sparse(docs) => docs.binary_search(&doc).is_ok(),
        }
    }

    /// First doc id at or after `target`
    pub fn next_at_or_after(&self, target: u32) -> Option<u32> {
        match self {
            DocSet::Empty => None,
            DocSet::Bits { words, .. } => {
                let mut word_index = (target / BITS_PER_WORD) as usize;
                let first = words.get(word_index)?;
                let mut word = first & (u64::MAX << (target % BITS_PER_WORD));
                loop {
                    if word != 0 {
                        return Some(word_index as u32 * BITS_PER_WORD + word.trailing_zeros());
                    }
                    word_index += 1;
                    word = *words.get(word_index)?;
                }
            }
            DocSet::Sparse(docs) => {
                let index = docs.partition_point(|&doc| doc < target);
                docs.get(index).copied()
            }
        }
    }

    /// Doc ids in increasing order
    pub fn to_vec(&self) -> Vec<u32> {
        let mut docs = Vec::with_capacity(self.len());
        let mut next = self.next_at_or_after(0);
        while let Some(doc) = next {
            docs.push(doc);
            next = doc.checked_add(1).and_then(|t| self.next_at_or_after(t));
        }
        docs
    }

    /// Approximate heap plus inline footprint in bytes
    pub fn ram_bytes_used(&self) -> usize {
        let heap = match self {
            DocSet::Empty => 0,
            DocSet::Bits { words, .. } => words.len() * mem::size_of::<u64>(),
            DocSet::Sparse(docs) => docs.len() * mem::size_of::<u32>(),
        };
        mem::size_of::<Self>() + heap
    }
}

/// Accumulates doc ids in increasing order into a [`DocSet`]
#[derive(Debug)]
pub struct DocSetBuilder {
    max_doc: u32,
    dense: bool,
    words: Vec<u64>,
    docs: Vec<u32>,
    len: usize,
}

impl DocSetBuilder {
    /// Builder for a segment of `max_doc` documents expecting about `cost` matches
    ///
    /// A bitset is used as soon as the expected matches reach 1% of the segment.
    pub fn new(max_doc: u32, cost: u64) -> Self {
        let dense = cost.saturating_mul(100) >= u64::from(max_doc);
        let words = if dense {
            vec![0; max_doc.div_ceil(BITS_PER_WORD) as usize]
        } else {
            Vec::new()
        };
        Self {
            max_doc,
            dense,
            words,
            docs: Vec::new(),
            len: 0,
        }
    }

    /// Whether the builder produces a bitset
    pub fn is_dense(&self) -> bool {
        self.dense
    }

    /// Add a doc id; ids must arrive in increasing order and be below `max_doc`
    pub fn add(&mut self, doc: u32) {
        debug_assert!(doc < self.max_doc, "doc {} out of range {}", doc, self.max_doc);
        if self.dense {
            let word = &mut self.words[(doc / BITS_PER_WORD) as usize];
            let bit = 1 << (doc % BITS_PER_WORD);
            if *word & bit == 0 {
                *word |= bit;
                self.len += 1;
            }
        } else if self.docs.last().map_or(true, |&last| last < doc) {
            self.docs.push(doc);
            self.len += 1;
        }
    }

    /// Freeze into a [`DocSet`]
    pub fn build(self) -> DocSet {
        if self.len == 0 {
            DocSet::Empty
        } else if self.dense {
            DocSet::Bits {
                words: self.words.into_boxed_slice(),
                len: self.len,
            }
        } else {
            DocSet::Sparse(self.docs.into_boxed_slice())
        }
    }
}

/// Iterator over a shared [`DocSet`]
#[derive(Debug)]
pub struct DocSetIterator {
    set: Arc<DocSet>,
    next_target: Option<u32>,
}

impl DocSetIterator {
    /// Iterate `set` from its first document
    pub fn new(set: Arc<DocSet>) -> Self {
        Self {
            set,
            next_target: Some(0),
        }
    }
}

impl DocIdIterator for DocSetIterator {
    fn next_doc(&mut self) -> Option<u32> {
        let target = self.next_target?;
        self.advance(target)
    }

    fn advance(&mut self, target: u32) -> Option<u32> {
        let doc = self.set.next_at_or_after(target);
        self.next_target = doc.and_then(|d| d.checked_add(1));
        doc
    }

    fn cost(&self) -> u64 {
        self.set.len() as u64
    }
}
