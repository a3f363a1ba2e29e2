//! Request-scoped state for reqscope.
//!
//! Each request gets a [`RequestStore`]: typed values, a string-keyed
//! [`ContextData`] view, and an ordered list of cleanup actions: wrapped in
//! a [`RequestContext`] that slots into any context chain. Values set on the
//! store shadow values of the same key further up the chain.
//!
//! ```
//! use reqscope_context::{background, ContextExt, ContextKey};
//! use reqscope_request::{new_request_context_for_test, RequestStore};
//!
//! const USER: ContextKey<String> = ContextKey::new("user");
//!
//! let ctx = new_request_context_for_test(background());
//! ctx.store().set_value(&USER, "alice".to_string());
//! assert_eq!(ctx.get(&USER).unwrap().as_str(), "alice");
//! assert!(RequestStore::from_context(&ctx).is_some());
//! ```

pub mod close;
pub mod context;
pub mod data;
pub mod dispatch;
pub mod factory;
pub mod store;

pub use close::Close;
pub use context::RequestContext;
pub use data::ContextData;
pub use dispatch::RequestFactory;
pub use factory::{RequestFinisher, new_request_context, new_request_context_for_test};
pub use store::RequestStore;
