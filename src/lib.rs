//! Entangld - a mesh of synchronized, hierarchical key-value stores
//!
//! Entangld is a Rust library for building a mesh of key-value stores that
//! synchronize over an opaque message channel. Each store owns a local tree
//! of structured values and may attach any number of named remote stores;
//! reads, writes, and subscriptions addressed into a remote's namespace are
//! forwarded transparently.
//!
//! # Key Features
//!
//! - **Hierarchical values**: the tree is `serde_json::Value` - nested
//!   objects, arrays, scalars, nulls - addressed by dotted paths
//! - **Transparent remotes**: `attach` a store under a namespace and
//!   `get`/`set`/`subscribe` through it as if it were local
//! - **Subscriptions**: prefix-matched change events with synchronous
//!   fan-out
//! - **Transport-agnostic**: core only - you provide a handler per remote
//!   that delivers [`Message`] values however you like
//! - **Embeddable**: single-threaded, callback-driven, no internal queues
//!   or scheduling
//!
//! # Quick Start
//!
//! ```rust
//! use entangld::Datastore;
//! use serde_json::json;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let mut store = Datastore::new();
//! store.set("users.alfred.role", json!("butler")).unwrap();
//!
//! let seen = Rc::new(RefCell::new(None));
//! let slot = seen.clone();
//! store
//!     .get("users.alfred", move |_, msg| {
//!         *slot.borrow_mut() = Some(msg.value.clone());
//!     }, None)
//!     .unwrap();
//! assert_eq!(*seen.borrow(), Some(json!({"role": "butler"})));
//! ```
//!
//! # Architecture
//!
//! A path whose first segment names an attached remote is forwarded: the
//! namespace is peeled off and the rest of the path travels in a
//! [`Message`] through the remote's handler. Replies and events come back
//! through [`Datastore::receive`], which correlates `value` replies by
//! uuid and fans `event` messages out to matching subscriptions.
//!
//! The types you'll work with:
//! - [`Datastore`] - the store engine and protocol dispatcher
//! - [`Message`] - the wire unit (`{type, path, uuid, value}`)
//! - [`RemoteId`] - stable handle minted by [`Datastore::attach`]
//!
//! # Non-goals
//!
//! Entangld intentionally does NOT provide:
//! - A network transport, framing, or event loop
//! - Persistence of the local tree
//! - Access control or schema validation
//! - Replication guarantees beyond what the transport's ordering gives
//! - Thread safety - callers serialize externally

pub mod error;
pub mod message;
mod path;
pub mod store;
mod tree;

pub use error::{Error, Result};
pub use message::{Message, MessageKind};
pub use store::{Datastore, RemoteId};
