//! Per-segment query evaluation
//!
//! A [`Weight`] is a query prepared for execution. For each segment it can
//! produce a [`DocIdIterator`], which callers may stop consuming at any
//! point, or a [`BulkScorer`], which always visits every match.

use std::sync::Arc;

use crate::error::Result;
use crate::query::{BooleanQuery, Occur, Query, Term};
use crate::segment::SegmentContext;

/// Forward-only iterator over matching doc ids of one segment
pub trait DocIdIterator: Send {
    /// Next matching doc id, or `None` once exhausted
    fn next_doc(&mut self) -> Option<u32>;

    /// First matching doc id at or beyond `target`
    ///
    /// `target` must be greater than the last returned doc id.
    fn advance(&mut self, target: u32) -> Option<u32> {
        while let Some(doc) = self.next_doc() {
            if doc >= target {
                return Some(doc);
            }
        }
        None
    }

    /// Upper bound on the number of matches
    fn cost(&self) -> u64;
}

/// Exhaustive evaluation over a whole segment
pub trait BulkScorer: Send {
    /// Feed every matching doc id, in increasing order, to `collector`
    fn score_all(&mut self, collector: &mut dyn FnMut(u32));

    /// Upper bound on the number of matches
    fn cost(&self) -> u64;
}

/// A query prepared for per-segment execution
pub trait Weight: Send + Sync {
    /// The query this weight evaluates
    fn query(&self) -> &Query;

    /// Iterator over the matches in `ctx`, `None` if nothing can match
    fn scorer(&self, ctx: &SegmentContext) -> Result<Option<Box<dyn DocIdIterator>>>;

    /// Exhaustive scorer over `ctx`, `None` if nothing can match
    fn bulk_scorer(&self, ctx: &SegmentContext) -> Result<Option<Box<dyn BulkScorer>>> {
        Ok(self
            .scorer(ctx)?
            .map(|it| Box::new(DefaultBulkScorer::new(it)) as Box<dyn BulkScorer>))
    }
}

/// Bulk scorer draining an iterator
pub struct DefaultBulkScorer {
    iter: Box<dyn DocIdIterator>,
}

impl DefaultBulkScorer {
    /// Wrap an iterator
    pub fn new(iter: Box<dyn DocIdIterator>) -> Self {
        Self { iter }
    }
}

impl BulkScorer for DefaultBulkScorer {
    fn score_all(&mut self, collector: &mut dyn FnMut(u32)) {
        while let Some(doc) = self.iter.next_doc() {
            collector(doc);
        }
    }

    fn cost(&self) -> u64 {
        self.iter.cost()
    }
}

/// Iterator over a postings list
pub struct PostingsIterator {
    docs: Arc<[u32]>,
    pos: usize,
}

impl PostingsIterator {
    /// Iterate sorted doc ids
    pub fn new(docs: Arc<[u32]>) -> Self {
        Self { docs, pos: 0 }
    }
}

impl DocIdIterator for PostingsIterator {
    fn next_doc(&mut self) -> Option<u32> {
        let doc = self.docs.get(self.pos).copied();
        self.pos += 1;
        doc
    }

    fn advance(&mut self, target: u32) -> Option<u32> {
        let rest = self.docs.get(self.pos..).unwrap_or(&[]);
        self.pos += rest.partition_point(|&doc| doc < target);
        self.next_doc()
    }

    fn cost(&self) -> u64 {
        self.docs.len() as u64
    }
}

/// Iterator over every doc id of a segment
pub struct AllDocsIterator {
    next: u32,
    max_doc: u32,
}

impl AllDocsIterator {
    /// Iterate `0..max_doc`
    pub fn new(max_doc: u32) -> Self {
        Self { next: 0, max_doc }
    }
}

impl DocIdIterator for AllDocsIterator {
    fn next_doc(&mut self) -> Option<u32> {
        if self.next >= self.max_doc {
            return None;
        }
        let doc = self.next;
        self.next += 1;
        Some(doc)
    }

    fn advance(&mut self, target: u32) -> Option<u32> {
        self.next = self.next.max(target);
        self.next_doc()
    }

    fn cost(&self) -> u64 {
        u64::from(self.max_doc)
    }
}

/// Intersection of iterators, led by the cheapest
pub struct ConjunctionIterator {
    iters: Vec<Box<dyn DocIdIterator>>,
    docs: Vec<Option<u32>>,
}

impl ConjunctionIterator {
    /// Intersect `iters`; must not be empty
    pub fn new(mut iters: Vec<Box<dyn DocIdIterator>>) -> Self {
        iters.sort_by_key(|it| it.cost());
        let docs = vec![None; iters.len()];
        Self { iters, docs }
    }

    fn align(&mut self, mut target: u32) -> Option<u32> {
        'lead: loop {
            for i in 1..self.iters.len() {
                let doc = match self.docs[i] {
                    Some(doc) if doc >= target => doc,
                    _ => self.iters[i].advance(target)?,
                };
                self.docs[i] = Some(doc);
                if doc > target {
                    target = self.iters[0].advance(doc)?;
                    self.docs[0] = Some(target);
                    continue 'lead;
                }
            }
            return Some(target);
        }
    }
}

impl DocIdIterator for ConjunctionIterator {
    fn next_doc(&mut self) -> Option<u32> {
        let lead = self.iters.first_mut()?.next_doc()?;
        self.docs[0] = Some(lead);
        self.align(lead)
    }

    fn advance(&mut self, target: u32) -> Option<u32> {
        let lead = self.iters.first_mut()?.advance(target)?;
        self.docs[0] = Some(lead);
        self.align(lead)
    }

    fn cost(&self) -> u64 {
        self.iters.first().map_or(0, |it| it.cost())
    }
}

/// Union of iterators
pub struct DisjunctionIterator {
    pending: Vec<Box<dyn DocIdIterator>>,
    heads: Vec<(u32, Box<dyn DocIdIterator>)>,
    current: Option<u32>,
    cost: u64,
}

impl DisjunctionIterator {
    /// Union of `iters`
    pub fn new(iters: Vec<Box<dyn DocIdIterator>>) -> Self {
        let cost = iters.iter().map(|it| it.cost()).sum();
        Self {
            pending: iters,
            heads: Vec::new(),
            current: None,
            cost,
        }
    }

    fn start(&mut self, target: u32) {
        for mut it in self.pending.drain(..) {
            if let Some(doc) = it.advance(target) {
                self.heads.push((doc, it));
            }
        }
    }

    fn settle(&mut self) -> Option<u32> {
        self.current = self.heads.iter().map(|(doc, _)| *doc).min();
        self.current
    }
}

impl DocIdIterator for DisjunctionIterator {
    fn next_doc(&mut self) -> Option<u32> {
        match self.current {
            None => self.start(0),
            Some(current) => {
                let mut i = 0;
                while i < self.heads.len() {
                    if self.heads[i].0 == current {
                        match self.heads[i].1.next_doc() {
                            Some(doc) => {
                                self.heads[i].0 = doc;
                                i += 1;
                            }
                            None => {
                                self.heads.swap_remove(i);
                            }
                        }
                    } else {
                        i += 1;
                    }
                }
            }
        }
        self.settle()
    }

    fn advance(&mut self, target: u32) -> Option<u32> {
        if self.current.is_none() {
            self.start(target);
            return self.settle();
        }
        let mut i = 0;
        while i < self.heads.len() {
            if self.heads[i].0 < target {
                match self.heads[i].1.advance(target) {
                    Some(doc) => {
                        self.heads[i].0 = doc;
                        i += 1;
                    }
                    None => {
                        self.heads.swap_remove(i);
                    }
                }
            } else {
                i += 1;
            }
        }
        self.settle()
    }

    fn cost(&self) -> u64 {
        self.cost
    }
}

/// Matches of `base` that are not matches of `excluded`
pub struct ExclusionIterator {
    base: Box<dyn DocIdIterator>,
    excluded: Option<Box<dyn DocIdIterator>>,
    excluded_doc: Option<u32>,
}

impl ExclusionIterator {
    /// `base` minus `excluded`
    pub fn new(base: Box<dyn DocIdIterator>, excluded: Box<dyn DocIdIterator>) -> Self {
        Self {
            base,
            excluded: Some(excluded),
            excluded_doc: None,
        }
    }

    fn is_excluded(&mut self, doc: u32) -> bool {
        if self.excluded_doc.map_or(true, |excluded| excluded < doc) {
            self.excluded_doc = match self.excluded.as_mut() {
                Some(it) => it.advance(doc),
                None => return false,
            };
            if self.excluded_doc.is_none() {
                self.excluded = None;
            }
        }
        self.excluded_doc == Some(doc)
    }

    fn accept(&mut self, mut doc: Option<u32>) -> Option<u32> {
        while let Some(candidate) = doc {
            if !self.is_excluded(candidate) {
                return Some(candidate);
            }
            doc = self.base.next_doc();
        }
        None
    }
}

impl DocIdIterator for ExclusionIterator {
    fn next_doc(&mut self) -> Option<u32> {
        let doc = self.base.next_doc();
        self.accept(doc)
    }

    fn advance(&mut self, target: u32) -> Option<u32> {
        let doc = self.base.advance(target);
        self.accept(doc)
    }

    fn cost(&self) -> u64 {
        self.base.cost()
    }
}

/// Weight matching every document
pub(crate) struct MatchAllWeight {
    query: Query,
}

impl MatchAllWeight {
    pub(crate) fn new() -> Self {
        Self {
            query: Query::MatchAll,
        }
    }
}

impl Weight for MatchAllWeight {
    fn query(&self) -> &Query {
        &self.query
    }

    fn scorer(&self, ctx: &SegmentContext) -> Result<Option<Box<dyn DocIdIterator>>> {
        ctx.segment().ensure_open()?;
        if ctx.max_doc() == 0 {
            return Ok(None);
        }
        Ok(Some(Box::new(AllDocsIterator::new(ctx.max_doc()))))
    }
}

/// Weight over a single term's postings
pub(crate) struct TermWeight {
    query: Query,
    term: Term,
}

impl TermWeight {
    pub(crate) fn new(term: Term) -> Self {
        Self {
            query: Query::Term(term.clone()),
            term,
        }
    }
}

impl Weight for TermWeight {
    fn query(&self) -> &Query {
        &self.query
    }

    fn scorer(&self, ctx: &SegmentContext) -> Result<Option<Box<dyn DocIdIterator>>> {
        ctx.segment().ensure_open()?;
        Ok(ctx
            .segment()
            .postings(&self.term)
            .map(|docs| Box::new(PostingsIterator::new(docs)) as Box<dyn DocIdIterator>))
    }
}

/// Weight combining clause weights
///
/// Required clauses (`Must`, `Filter`) are intersected. Without required
/// clauses the `Should` clauses are unioned; with them they do not affect
/// matching. `MustNot` clauses are subtracted.
pub(crate) struct BooleanWeight {
    query: Query,
    required: Vec<Box<dyn Weight>>,
    optional: Vec<Box<dyn Weight>>,
    prohibited: Vec<Box<dyn Weight>>,
}

impl BooleanWeight {
    pub(crate) fn new(
        query: &BooleanQuery,
        mut create: impl FnMut(&Query) -> Box<dyn Weight>,
    ) -> Self {
        let mut required = Vec::new();
        let mut optional = Vec::new();
        let mut prohibited = Vec::new();
        for (occur, clause) in query.clauses() {
            let weight = create(clause);
            match occur {
                Occur::Must | Occur::Filter => required.push(weight),
                Occur::Should => optional.push(weight),
                Occur::MustNot => prohibited.push(weight),
            }
        }
        Self {
            query: Query::Bool(query.clone()),
            required,
            optional,
            prohibited,
        }
    }
}

impl Weight for BooleanWeight {
    fn query(&self) -> &Query {
        &self.query
    }

    fn scorer(&self, ctx: &SegmentContext) -> Result<Option<Box<dyn DocIdIterator>>> {
        ctx.segment().ensure_open()?;
        let base: Box<dyn DocIdIterator> = if !self.required.is_empty() {
            let mut iters = Vec::with_capacity(self.required.len());
            for weight in &self.required {
                match weight.scorer(ctx)? {
                    Some(it) => iters.push(it),
                    None => return Ok(None),
                }
            }
            if iters.len() == 1 {
                iters.remove(0)
            } else {
                Box::new(ConjunctionIterator::new(iters))
            }
        } else {
            let mut iters = Vec::with_capacity(self.optional.len());
            for weight in &self.optional {
                if let Some(it) = weight.scorer(ctx)? {
                    iters.push(it);
                }
            }
            if iters.is_empty() {
                return Ok(None);
            }
            Box::new(DisjunctionIterator::new(iters))
        };

        let mut excluded = Vec::new();
        for weight in &self.prohibited {
            if let Some(it) = weight.scorer(ctx)? {
                excluded.push(it);
            }
        }
        if excluded.is_empty() {
            return Ok(Some(base));
        }
        let excluded = Box::new(DisjunctionIterator::new(excluded));
        Ok(Some(Box::new(ExclusionIterator::new(base, excluded))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn postings(docs: &[u32]) -> Box<dyn DocIdIterator> {
        Box::new(PostingsIterator::new(Arc::from(docs)))
    }

    fn drain(mut it: Box<dyn DocIdIterator>) -> Vec<u32> {
        let mut docs = Vec::new();
        while let Some(doc) = it.next_doc() {
            docs.push(doc);
        }
        docs
    }

    #[test]
    fn test_postings_advance() {
        let mut it = PostingsIterator::new(Arc::from(&[1, 4, 9, 12][..]));
        assert_eq!(it.next_doc(), Some(1));
        assert_eq!(it.advance(5), Some(9));
        assert_eq!(it.advance(13), None);
    }

    #[test]
    fn test_conjunction() {
        let it = ConjunctionIterator::new(vec![
            postings(&[1, 2, 3, 5, 8, 13]),
            postings(&[2, 3, 5, 7, 11, 13]),
            postings(&[3, 5, 13, 21]),
        ]);
        assert_eq!(drain(Box::new(it)), vec![3, 5, 13]);
    }

    #[test]
    fn test_disjunction() {
        let it = DisjunctionIterator::new(vec![postings(&[1, 5, 9]), postings(&[2, 5, 10])]);
        assert_eq!(drain(Box::new(it)), vec![1, 2, 5, 9, 10]);
    }

    #[test]
    fn test_disjunction_advance() {
        let mut it = DisjunctionIterator::new(vec![postings(&[1, 5, 9]), postings(&[2, 6, 10])]);
        assert_eq!(it.advance(3), Some(5));
        assert_eq!(it.next_doc(), Some(6));
        assert_eq!(it.advance(10), Some(10));
        assert_eq!(it.next_doc(), None);
    }

    #[test]
    fn test_exclusion() {
        let it = ExclusionIterator::new(
            Box::new(AllDocsIterator::new(8)),
            postings(&[0, 3, 4, 7]),
        );
        assert_eq!(drain(Box::new(it)), vec![1, 2, 5, 6]);
    }

    #[test]
    fn test_default_bulk_scorer_visits_all() {
        let mut scorer = DefaultBulkScorer::new(postings(&[0, 2, 4]));
        let mut seen = Vec::new();
        scorer.score_all(&mut |doc| seen.push(doc));
        assert_eq!(seen, vec![0, 2, 4]);
        assert_eq!(scorer.cost(), 3);
    }
}
