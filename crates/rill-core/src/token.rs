//! Sequence tokens correlating requests with the work they trigger.
//!
//! A producer mints a [`Token`] for each unit of work it starts in response
//! to an external request (refresh, pagination). The requester holds the
//! [`TokenSet`] collected for its request and can tell, by comparing sequence
//! ids, when that specific unit of work has been reflected in the message
//! stream. Tokens are immutable; [`Token::next`] returns a new value.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Opaque identity of a token producer.
///
/// Allocated from a process-wide counter; two producers never share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Allocate a fresh producer identity.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// An immutable sequence token.
///
/// Within one root context, sequence ids are monotonically non-decreasing
/// per source: a later token logically supersedes an earlier one from the
/// same source. Tokens from different sources (or different root contexts)
/// are never comparable for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    source: SourceId,
    root_context_id: u32,
    sequence_id: u32,
}

impl Token {
    /// First token of a source within a root context (sequence 0).
    pub fn initial(source: SourceId, root_context_id: u32) -> Self {
        Self {
            source,
            root_context_id,
            sequence_id: 0,
        }
    }

    /// The producer that minted this token.
    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Identifier shared by the whole context tree this token belongs to.
    pub fn root_context_id(&self) -> u32 {
        self.root_context_id
    }

    /// Position of this token in its source's sequence.
    pub fn sequence_id(&self) -> u32 {
        self.sequence_id
    }

    pub(crate) fn with_sequence(source: SourceId, root_context_id: u32, sequence_id: u32) -> Self {
        Self {
            source,
            root_context_id,
            sequence_id,
        }
    }

    /// Pure successor: same source and root, sequence + 1.
    pub fn next(&self) -> Self {
        Self {
            sequence_id: self.sequence_id.saturating_add(1),
            ..*self
        }
    }
}

impl PartialOrd for Token {
    /// Ordering is defined only between tokens of the same source within the
    /// same root context; everything else compares as `None`.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.source == other.source && self.root_context_id == other.root_context_id {
            Some(self.sequence_id.cmp(&other.sequence_id))
        } else {
            None
        }
    }
}

/// Immutable ordered list of the tokens minted in response to one request.
#[derive(Debug, Clone, Default)]
pub struct TokenSet {
    tokens: Arc<[Token]>,
}

impl TokenSet {
    /// Tokens in the order they were collected.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Whether any producer picked the request up.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of collected tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether `candidate` supersedes or equals some token in this set.
    ///
    /// Used by requesters to recognize that the work for their request (or
    /// later work from the same source) has been reflected.
    pub fn is_satisfied_by(&self, candidate: &Token) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t.partial_cmp(candidate), Some(Ordering::Less | Ordering::Equal)))
    }
}

/// Append-only accumulator shared between a request and the producers that
/// answer it. Closed by the requester once the request has been dispatched;
/// late appends are dropped.
#[derive(Debug, Default)]
pub struct TokenCollector {
    tokens: Mutex<Vec<Token>>,
    closed: AtomicBool,
}

impl TokenCollector {
    /// Create an open collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a token minted (or coalesced) for the request.
    ///
    /// No-op after [`close`](Self::close).
    pub fn push(&self, token: Token) {
        if self.closed.load(AtomicOrdering::Acquire) {
            tracing::debug!(?token, "token dropped: collector already closed");
            return;
        }
        self.tokens.lock().push(token);
    }

    /// Close the collector and freeze its contents into a [`TokenSet`].
    pub fn close(&self) -> TokenSet {
        self.closed.store(true, AtomicOrdering::Release);
        TokenSet {
            tokens: self.tokens.lock().clone().into(),
        }
    }

    /// Snapshot the tokens collected so far without closing.
    pub fn token_set(&self) -> TokenSet {
        TokenSet {
            tokens: self.tokens.lock().clone().into(),
        }
    }
}
