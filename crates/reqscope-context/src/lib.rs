//! reqscope context chain
//!
//! A cancellable, value-bearing context in the spirit of a request-scoped
//! execution context. Contexts form a chain from a root ([`background`])
//! through derived nodes: cancellation ([`with_cancel`]), deadlines
//! ([`with_deadline`], [`with_timeout`]) and single values ([`with_value`]).
//!
//! Every node answers four questions: when is the deadline, what is the
//! cancellation signal, why did it end, and what value is stored under a key.
//! Nodes that do not own an answer forward the question to their parent.

pub mod cancel;
pub mod context;
pub mod error;
pub mod key;
pub mod value;

pub use cancel::{CancelContext, CancelHandle, with_cancel, with_deadline, with_timeout};
pub use context::{AnyValue, Background, Context, ContextExt, ContextRef, background};
pub use error::ContextError;
pub use key::{ContextKey, KeyId};
pub use value::{ValueContext, with_value};

pub use tokio_util::sync::CancellationToken;
