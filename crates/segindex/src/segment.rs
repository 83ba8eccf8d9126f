//! Segment cores, reader views and segment lifecycle
//!
//! A [`Segment`] is the immutable core shared by every reader view over the
//! same physical data. Readers take a reference on open and release it on
//! close; when the last reference goes away the core closes and its close
//! listeners fire exactly once.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::query::Term;

static NEXT_SEGMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a segment core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(u64);

impl SegmentId {
    fn next() -> Self {
        SegmentId(NEXT_SEGMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value of this id
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_seg{}", self.0)
    }
}

/// Callback invoked once when a segment core closes
pub type CloseListener = Box<dyn FnOnce(SegmentId) + Send>;

/// Handle returned by [`Segment::add_close_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Lifecycle {
    refs: usize,
    closed: bool,
    next_listener: u64,
    listeners: Vec<(ListenerId, CloseListener)>,
}

/// Immutable segment core
pub struct Segment {
    id: SegmentId,
    max_doc: u32,
    postings: HashMap<Term, Arc<[u32]>, RandomState>,
    lifecycle: Mutex<Lifecycle>,
}

impl Segment {
    /// Segment identity
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Number of documents in this segment
    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    /// Sorted doc ids of the documents containing `term`
    pub fn postings(&self, term: &Term) -> Option<Arc<[u32]>> {
        self.postings.get(term).cloned()
    }

    /// Number of documents containing `term`
    pub fn doc_freq(&self, term: &Term) -> usize {
        self.postings.get(term).map_or(0, |docs| docs.len())
    }

    /// Whether the core has been closed
    pub fn is_closed(&self) -> bool {
        self.lifecycle.lock().closed
    }

    /// Fails with [`Error::SegmentClosed`] once the core is closed
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SegmentClosed(self.id));
        }
        Ok(())
    }

    /// Register a listener fired when this core closes
    ///
    /// Fails if the core is already closed; in that case the listener is
    /// dropped without being called.
    pub fn add_close_listener(&self, listener: CloseListener) -> Result<ListenerId> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.closed {
            return Err(Error::SegmentClosed(self.id));
        }
        let id = ListenerId(lifecycle.next_listener);
        lifecycle.next_listener += 1;
        lifecycle.listeners.push((id, listener));
        Ok(id)
    }

    /// Deregister a listener; returns false if it already fired or is unknown
    pub fn remove_close_listener(&self, id: ListenerId) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        let before = lifecycle.listeners.len();
        lifecycle.listeners.retain(|(listener_id, _)| *listener_id != id);
        lifecycle.listeners.len() != before
    }

    /// Number of registered close listeners
    pub fn close_listener_count(&self) -> usize {
        self.lifecycle.lock().listeners.len()
    }

    /// Take a reference on behalf of a reader view
    pub fn inc_ref(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.closed {
            return Err(Error::SegmentClosed(self.id));
        }
        lifecycle.refs += 1;
        Ok(())
    }

    /// Release a reference; the last release closes the core
    pub fn dec_ref(&self) {
        let last = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.refs = lifecycle.refs.saturating_sub(1);
            lifecycle.refs == 0
        };
        if last {
            self.close();
        }
    }

    /// Close the core and notify listeners in registration order
    ///
    /// Listeners are drained under the lifecycle lock and invoked after it is
    /// released, so a listener may take its own locks freely. Idempotent.
    pub fn close(&self) {
        let listeners = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.closed {
                return;
            }
            lifecycle.closed = true;
            std::mem::take(&mut lifecycle.listeners)
        };
        debug!(segment = %self.id, listeners = listeners.len(), "closing segment core");
        for (_, listener) in listeners {
            listener(self.id);
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("max_doc", &self.max_doc)
            .field("terms", &self.postings.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Accumulates documents into a new segment core
#[derive(Debug, Default)]
pub struct SegmentBuilder {
    max_doc: u32,
    postings: HashMap<Term, Vec<u32>, RandomState>,
}

impl SegmentBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document made of untokenized `(field, value)` pairs
    ///
    /// # Returns
    /// * `u32` - Segment-local doc id of the new document
    pub fn add_document<'a, I>(&mut self, fields: I) -> u32
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let doc = self.max_doc;
        for (field, value) in fields {
            let docs = self.postings.entry(Term::new(field, value)).or_default();
            // A repeated field value must not list the doc twice
            if docs.last() != Some(&doc) {
                docs.push(doc);
            }
        }
        self.max_doc += 1;
        doc
    }

    /// Number of documents added so far
    pub fn len(&self) -> u32 {
        self.max_doc
    }

    /// Whether no documents were added
    pub fn is_empty(&self) -> bool {
        self.max_doc == 0
    }

    /// Freeze the accumulated documents into a segment core
    pub fn build(self) -> Arc<Segment> {
        let postings = self
            .postings
            .into_iter()
            .map(|(term, docs)| (term, Arc::from(docs)))
            .collect();
        Arc::new(Segment {
            id: SegmentId::next(),
            max_doc: self.max_doc,
            postings,
            lifecycle: Mutex::new(Lifecycle {
                refs: 0,
                closed: false,
                next_listener: 0,
                listeners: Vec::new(),
            }),
        })
    }
}

/// Per-segment evaluation context handed to weights and caching policies
#[derive(Debug, Clone)]
pub struct SegmentContext {
    segment: Arc<Segment>,
    ord: usize,
    doc_base: u32,
    index_max_doc: u32,
}

impl SegmentContext {
    /// Context for a segment searched on its own
    pub fn standalone(segment: Arc<Segment>) -> Self {
        let index_max_doc = segment.max_doc();
        Self {
            segment,
            ord: 0,
            doc_base: 0,
            index_max_doc,
        }
    }

    /// The segment core
    pub fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    /// Identity of the segment core
    pub fn id(&self) -> SegmentId {
        self.segment.id()
    }

    /// Number of documents in the segment
    pub fn max_doc(&self) -> u32 {
        self.segment.max_doc()
    }

    /// Number of documents in the whole reader this segment belongs to
    pub fn index_max_doc(&self) -> u32 {
        self.index_max_doc
    }

    /// Position of the segment within its reader
    pub fn ord(&self) -> usize {
        self.ord
    }

    /// Offset added to segment-local doc ids to obtain reader-level ids
    pub fn doc_base(&self) -> u32 {
        self.doc_base
    }
}

/// Point-in-time view over a list of segment cores
pub struct IndexReader {
    segments: Vec<Arc<Segment>>,
    max_doc: u32,
    closed: AtomicBool,
}

impl IndexReader {
    /// Open a view, taking a reference on every segment core
    pub fn open(segments: Vec<Arc<Segment>>) -> Result<Self> {
        for (i, segment) in segments.iter().enumerate() {
            if let Err(e) = segment.inc_ref() {
                for opened in &segments[..i] {
                    opened.dec_ref();
                }
                return Err(e);
            }
        }
        let max_doc = segments.iter().map(|s| s.max_doc()).sum();
        Ok(Self {
            segments,
            max_doc,
            closed: AtomicBool::new(false),
        })
    }

    /// Open a new view sharing the cores of this one, minus `dropped`, plus `added`
    ///
    /// Shared cores keep their [`SegmentId`], so cache entries survive the reopen.
    pub fn reopen(&self, added: Vec<Arc<Segment>>, dropped: &[SegmentId]) -> Result<Self> {
        if self.is_closed() {
            return Err(Error::ReaderClosed);
        }
        let segments = self
            .segments
            .iter()
            .filter(|s| !dropped.contains(&s.id()))
            .cloned()
            .chain(added)
            .collect();
        Self::open(segments)
    }

    /// Per-segment contexts in reader order
    pub fn leaves(&self) -> Vec<SegmentContext> {
        let mut doc_base = 0;
        self.segments
            .iter()
            .enumerate()
            .map(|(ord, segment)| {
                let ctx = SegmentContext {
                    segment: Arc::clone(segment),
                    ord,
                    doc_base,
                    index_max_doc: self.max_doc,
                };
                doc_base += segment.max_doc();
                ctx
            })
            .collect()
    }

    /// Segment cores of this view
    pub fn segments(&self) -> &[Arc<Segment>] {
        &self.segments
    }

    /// Total number of documents
    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    /// Whether this view has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release this view's references; idempotent
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for segment in &self.segments {
            segment.dec_ref();
        }
    }
}

impl Drop for IndexReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for IndexReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexReader")
            .field("segments", &self.segments.len())
            .field("max_doc", &self.max_doc)
            .field("closed", &self.is_closed())
            .finish()
    }
}
