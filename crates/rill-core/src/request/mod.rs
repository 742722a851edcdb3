//! # Requests
//!
//! Consumers ask producers for work (refresh, pagination, selection) by
//! sending a [`FeedRequest`] on their context node; the request propagates
//! upward through the context tree. Producers answer by minting tokens into
//! the request's [`TokenCollector`], which the requester reads to learn
//! which producers picked the request up and which sequence ids to watch
//! for.

mod manager;

pub use manager::{CoercingRequestManager, SequentialRequestManager};

use std::sync::Arc;

use crate::message::SelectionInfo;
use crate::token::TokenCollector;

/// The kinds of work a consumer can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Reload from scratch.
    Refresh,
    /// Load more items.
    Page,
    /// Change the selection.
    Select,
}

/// A request routed from a consumer up to a producer.
#[derive(Debug, Clone)]
pub struct FeedRequest {
    kind: RequestKind,
    desired_count: Option<u32>,
    selection: Option<SelectionInfo>,
    tokens: Arc<TokenCollector>,
}

impl FeedRequest {
    /// A refresh request.
    pub fn refresh() -> Self {
        Self {
            kind: RequestKind::Refresh,
            desired_count: None,
            selection: None,
            tokens: Arc::new(TokenCollector::new()),
        }
    }

    /// A pagination request, optionally hinting how many items to load.
    pub fn page(desired_count: Option<u32>) -> Self {
        Self {
            kind: RequestKind::Page,
            desired_count,
            selection: None,
            tokens: Arc::new(TokenCollector::new()),
        }
    }

    /// A selection-change request.
    pub fn select(selection: SelectionInfo) -> Self {
        Self {
            kind: RequestKind::Select,
            desired_count: None,
            selection: Some(selection),
            tokens: Arc::new(TokenCollector::new()),
        }
    }

    /// What is being requested.
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Pagination hint, when [`RequestKind::Page`].
    pub fn desired_count(&self) -> Option<u32> {
        self.desired_count
    }

    /// Requested selection, when [`RequestKind::Select`].
    pub fn selection(&self) -> Option<&SelectionInfo> {
        self.selection.as_ref()
    }

    /// The collector producers answer into.
    pub fn tokens(&self) -> &Arc<TokenCollector> {
        &self.tokens
    }
}
