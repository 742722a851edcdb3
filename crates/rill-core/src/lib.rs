//! Rill Core - Reactive Engine Foundation
//!
//! Foundational types for the Rill reactive feed/state engine: sequence
//! tokens correlating requests with the work they trigger, the immutable
//! multi-axis [`Message`](message::Message) model with exact changed-axis
//! tracking, the hierarchical [`SourceContext`](context::SourceContext)
//! tree propagating cancellation and requests between nested subscriptions,
//! and the request-to-token managers producers consume.
//!
//! Everything here is either immutable and freely shared (messages, tokens)
//! or owns its synchronization (contexts, managers); there is no global
//! state and no global dispatcher.

#![forbid(unsafe_code)]

/// Source contexts: subscription scopes, cancellation, request routing.
pub mod context;

/// Execution-context abstraction for thread-affine work.
pub mod dispatcher;

/// Unified error handling.
pub mod errors;

/// Immutable multi-axis messages and their builder.
pub mod message;

/// Requests and request-to-token managers.
pub mod request;

/// Sequence tokens and token sets.
pub mod token;

pub use context::{CancellationToken, OwnerKey, SourceContext};
pub use dispatcher::{Dispatcher, InlineDispatcher};
pub use errors::FeedError;
pub use message::{
    custom_value, custom_value_as, AxisSet, AxisValue, CustomAxis, Data, Message, MessageAxis,
    MessageBuilder, MessageEntry, PaginationInfo, SelectionInfo,
};
pub use request::{
    CoercingRequestManager, FeedRequest, RequestKind, SequentialRequestManager,
};
pub use token::{SourceId, Token, TokenCollector, TokenSet};
