//! The datastore engine: namespace resolution, request correlation, the
//! subscription registry, and the protocol dispatcher.
//!
//! A [`Datastore`] owns one local tree and any number of attached remotes.
//! Reads, writes, and subscriptions addressed into a remote's namespace
//! are forwarded through that remote's handler after peeling the
//! namespace; everything else operates on the local tree. Inbound traffic
//! enters through [`Datastore::receive`].
//!
//! The engine is single-threaded and callback-driven: every operation runs
//! to completion on the calling thread, including downstream callbacks.
//! Reentrancy is supported — callbacks receive the store itself and may
//! issue further operations mid-dispatch.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::Result;
use crate::message::{Message, MessageKind};
use crate::path::{prefix_matches, strip_namespace, to_segments};
use crate::tree;

/// Stable identity of an attached remote.
///
/// Minted at [`Datastore::attach`]; subscription and request records hold
/// the id rather than any reference into the registry, so resolving a
/// stale id after [`Datastore::detach`] fails softly as "remote not
/// found" instead of dangling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteId(u64);

/// Transport callback: serialize and deliver one message to the remote.
///
/// Invoked synchronously whenever the engine needs to send. The handler
/// must not re-enter the store during the call itself; queueing the
/// message for later delivery is the expected shape.
pub type Handler = Box<dyn FnMut(&Message)>;

/// One-shot completion for [`Datastore::get`]. The callback receives the
/// store itself so it may legally issue further operations.
pub type GetFn = Box<dyn FnOnce(&mut Datastore, &Message)>;

/// Standing subscription callback, fired once per matching event.
pub type WatchFn = Rc<dyn Fn(&mut Datastore, &Message)>;

/// Produces correlation tokens, unique within the process lifetime.
pub type UuidFn = Box<dyn FnMut() -> String>;

struct Remote {
    id: RemoteId,
    handler: Handler,
}

/// Where a `value` reply is delivered.
enum Reply {
    /// Embedder closure, consumed on first use.
    Callback(GetFn),
    /// Forward the reply to the remote the request came from.
    Remote(RemoteId),
}

/// Where `event` messages are delivered.
#[derive(Clone)]
enum Sink {
    /// Embedder closure.
    Local(WatchFn),
    /// Forward the event to the remote that subscribed.
    Forward(RemoteId),
}

/// Outstanding remote `get`, keyed by uuid in the request table.
struct Pending {
    reply: Reply,
}

enum Scope {
    /// Watches a prefix of the local tree; `segments` is the pointer form
    /// of the watched path.
    Local { segments: Vec<String> },
    /// Proxies events arriving from an attached remote; the record's path
    /// is remote-side (namespace already peeled).
    Remote { remote: RemoteId },
}

struct Subscription {
    path: String,
    uuid: String,
    scope: Scope,
    sink: Sink,
}

/// A hierarchical key-value store that can mesh with remote stores over
/// an opaque message channel.
pub struct Datastore {
    data: Value,
    remotes: HashMap<String, Remote>,
    requests: HashMap<String, Pending>,
    subscriptions: Vec<Subscription>,
    next_remote_id: u64,
    uuid_gen: UuidFn,
}

impl Datastore {
    /// Store with an empty object at the root.
    pub fn new() -> Self {
        Self::with_data(Value::Object(Map::new()))
    }

    /// Store with `data` as the initial tree.
    pub fn with_data(data: Value) -> Self {
        Self {
            data,
            remotes: HashMap::new(),
            requests: HashMap::new(),
            subscriptions: Vec::new(),
            next_remote_id: 0,
            uuid_gen: Box::new(|| uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Replace the correlation-token source. Tokens must stay unique for
    /// the process lifetime; the default is a v4 UUID string.
    pub fn set_uuid_generator(&mut self, generator: impl FnMut() -> String + 'static) {
        self.uuid_gen = Box::new(generator);
    }

    /// The current local tree.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Number of standing subscription records.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Number of outstanding remote `get` requests.
    pub fn pending_request_count(&self) -> usize {
        self.requests.len()
    }

    /// Register `handler` as the transport for the `name` namespace.
    /// Re-attaching an existing name replaces the record; the old id goes
    /// stale.
    pub fn attach(&mut self, name: &str, handler: impl FnMut(&Message) + 'static) -> RemoteId {
        self.next_remote_id += 1;
        let id = RemoteId(self.next_remote_id);
        self.remotes.insert(
            name.to_string(),
            Remote {
                id,
                handler: Box::new(handler),
            },
        );
        debug!(name, ?id, "attached remote");
        id
    }

    /// Remove the remote registered under `name`.
    ///
    /// Subscriptions and pending requests that still reference the remote
    /// are not pruned; their ids simply stop resolving, and later traffic
    /// for them is dropped with a log line. Returns whether a record was
    /// removed.
    pub fn detach(&mut self, name: &str) -> bool {
        let removed = self.remotes.remove(name).is_some();
        if removed {
            debug!(name, "detached remote");
        }
        removed
    }

    /// Request the value at `path`.
    ///
    /// Exactly one `value` message reaches `callback`: synchronously
    /// before this call returns when the path is local, or from a later
    /// [`receive`](Self::receive) carrying the matching reply when it is
    /// remote. An absent local path yields `Value::Null`, never an error.
    /// A caller-supplied `uuid` is used as the correlation token verbatim;
    /// one is generated when absent. Returns the correlation uuid, usable
    /// with [`cancel`](Self::cancel).
    pub fn get(
        &mut self,
        path: &str,
        callback: impl FnOnce(&mut Datastore, &Message) + 'static,
        uuid: Option<&str>,
    ) -> Result<String> {
        self.get_inner(
            path,
            Reply::Callback(Box::new(callback)),
            uuid.map(String::from),
        )
    }

    /// Drop the pending request identified by `uuid`; a late reply will
    /// then be discarded. Returns whether anything was pending.
    pub fn cancel(&mut self, uuid: &str) -> bool {
        self.requests.remove(uuid).is_some()
    }

    /// Write `value` at `path`, replacing whatever is there.
    ///
    /// Local writes autovivify missing intermediate objects and then fan
    /// out events to every matching local subscription before returning.
    /// Remote writes transmit a fire-and-forget `set` with no uuid.
    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        self.set_inner(path, value, false)
    }

    /// Append `value` to the array at `path`. An absent local target
    /// becomes a fresh one-element array.
    pub fn push(&mut self, path: &str, value: Value) -> Result<()> {
        self.set_inner(path, value, true)
    }

    /// Watch `path` for changes.
    ///
    /// For a local path, `callback` fires on every write whose path begins
    /// with the watched prefix (string-prefix matching), carrying the
    /// current value *at the watched prefix*. For a remote path, a proxy
    /// record is kept here and a `subscribe` is transmitted so the remote
    /// starts streaming `event` messages back. A caller-supplied `uuid`
    /// identifies the subscription verbatim; one is generated when
    /// absent. Returns the subscription uuid, usable for targeted
    /// [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(
        &mut self,
        path: &str,
        callback: impl Fn(&mut Datastore, &Message) + 'static,
        uuid: Option<&str>,
    ) -> Result<String> {
        self.subscribe_inner(path, Sink::Local(Rc::new(callback)), uuid.map(String::from))
    }

    /// Remove subscription records matching `path` (and `uuid`, when
    /// given). Returns how many records were removed.
    ///
    /// Matching follows the wire protocol's direction: a record is removed
    /// when the *given* path starts with the record's watched path, so
    /// unsubscribing at a deeper-or-equal path removes shallower-or-equal
    /// records. Remote records additionally require that `path`'s
    /// namespace resolves to the record's remote, and an `unsubscribe` is
    /// transmitted for each of them.
    pub fn unsubscribe(&mut self, path: &str, uuid: Option<&str>) -> usize {
        let ns = self.parse_namespace(path);
        let remote_id = ns.as_ref().map(|n| self.remotes[n].id);

        let (removed, kept) = std::mem::take(&mut self.subscriptions)
            .into_iter()
            .partition::<Vec<_>, _>(|sub| {
                unsubscribe_matches(sub, path, uuid, ns.as_deref(), remote_id)
            });
        self.subscriptions = kept;

        let count = removed.len();
        for sub in removed {
            if let Scope::Remote { remote } = sub.scope {
                let msg = Message {
                    kind: MessageKind::Unsubscribe,
                    path: sub.path,
                    uuid: sub.uuid,
                    value: Value::Null,
                };
                self.transmit(remote, &msg);
            }
        }
        count
    }

    /// Dispatch one inbound message from the remote attached as
    /// `from_namespace`.
    ///
    /// This is the protocol state machine; it re-enters the public
    /// operations on the sender's behalf, synchronously on the caller's
    /// thread. Every failure on this path — unknown reply uuid, unattached
    /// namespace, malformed path, tree type error from an inbound write —
    /// is logged and dropped rather than surfaced, so one bad message
    /// cannot take the mesh down.
    pub fn receive(&mut self, msg: &Message, from_namespace: &str) {
        debug!(kind = ?msg.kind, path = %msg.path, from = from_namespace, "receive");
        match msg.kind {
            MessageKind::Set => {
                if let Err(err) = self.set(&msg.path, msg.value.clone()) {
                    warn!(%err, path = %msg.path, "dropping inbound set");
                }
            }
            MessageKind::Push => {
                if let Err(err) = self.push(&msg.path, msg.value.clone()) {
                    warn!(%err, path = %msg.path, "dropping inbound push");
                }
            }
            MessageKind::Get => {
                let Some(origin) = self.remote_id_of(from_namespace) else {
                    warn!(from = from_namespace, "dropping get from unattached namespace");
                    return;
                };
                if let Err(err) =
                    self.get_inner(&msg.path, Reply::Remote(origin), Some(msg.uuid.clone()))
                {
                    warn!(%err, path = %msg.path, "dropping inbound get");
                }
            }
            MessageKind::Value => match self.requests.remove(&msg.uuid) {
                Some(pending) => self.deliver_reply(pending.reply, msg),
                None => warn!(uuid = %msg.uuid, "no pending request matches value reply"),
            },
            MessageKind::Subscribe => {
                let Some(origin) = self.remote_id_of(from_namespace) else {
                    warn!(
                        from = from_namespace,
                        "dropping subscribe from unattached namespace"
                    );
                    return;
                };
                if let Err(err) =
                    self.subscribe_inner(&msg.path, Sink::Forward(origin), Some(msg.uuid.clone()))
                {
                    warn!(%err, path = %msg.path, "dropping inbound subscribe");
                }
            }
            MessageKind::Event => {
                let Some(origin) = self.remote_id_of(from_namespace) else {
                    warn!(from = from_namespace, "dropping event from unattached namespace");
                    return;
                };
                let matched: Vec<Sink> = self
                    .subscriptions
                    .iter()
                    .filter(|sub| match &sub.scope {
                        Scope::Remote { remote } => {
                            *remote == origin && prefix_matches(&msg.path, &sub.path)
                        }
                        Scope::Local { .. } => false,
                    })
                    .map(|sub| sub.sink.clone())
                    .collect();
                for sink in matched {
                    self.deliver_event(sink, msg);
                }
            }
            MessageKind::Unsubscribe => {
                self.unsubscribe(&msg.path, Some(&msg.uuid));
            }
        }
    }

    /// Name of the attached remote whose namespace prefixes `path`, if
    /// any. Namespaces are matched segment-wise (`name` followed by a
    /// dot); a path equal to a bare remote name is local.
    fn parse_namespace(&self, path: &str) -> Option<String> {
        self.remotes
            .keys()
            .find(|name| {
                path.strip_prefix(name.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
            })
            .cloned()
    }

    fn remote_id_of(&self, name: &str) -> Option<RemoteId> {
        self.remotes.get(name).map(|r| r.id)
    }

    /// Hand `msg` to the remote's handler. A stale id is dropped with a
    /// log line.
    fn transmit(&mut self, id: RemoteId, msg: &Message) {
        match self.remotes.values_mut().find(|r| r.id == id) {
            Some(remote) => (remote.handler)(msg),
            None => warn!(?id, kind = ?msg.kind, "dropping message for detached remote"),
        }
    }

    fn uuid_or_generate(&mut self, uuid: Option<String>) -> String {
        match uuid {
            Some(u) if !u.is_empty() => u,
            _ => (self.uuid_gen)(),
        }
    }

    fn get_inner(&mut self, path: &str, reply: Reply, uuid: Option<String>) -> Result<String> {
        let uuid = self.uuid_or_generate(uuid);
        match self.parse_namespace(path) {
            None => {
                let segments = to_segments(path)?;
                let value = tree::read(&self.data, &segments)
                    .cloned()
                    .unwrap_or(Value::Null);
                let msg = Message {
                    kind: MessageKind::Value,
                    path: path.to_string(),
                    uuid: uuid.clone(),
                    value,
                };
                self.deliver_reply(reply, &msg);
            }
            Some(ns) => {
                let remote = self.remotes[&ns].id;
                let msg = Message {
                    kind: MessageKind::Get,
                    path: strip_namespace(path, &ns).to_string(),
                    uuid: uuid.clone(),
                    value: Value::Null,
                };
                self.requests.insert(uuid.clone(), Pending { reply });
                self.transmit(remote, &msg);
            }
        }
        Ok(uuid)
    }

    fn set_inner(&mut self, path: &str, value: Value, push: bool) -> Result<()> {
        match self.parse_namespace(path) {
            None => {
                let segments = to_segments(path)?;
                if push {
                    tree::append(&mut self.data, &segments, value)?;
                } else {
                    tree::assign(&mut self.data, &segments, value)?;
                }
                self.fan_out(path);
            }
            Some(ns) => {
                let remote = self.remotes[&ns].id;
                let msg = Message {
                    kind: if push {
                        MessageKind::Push
                    } else {
                        MessageKind::Set
                    },
                    path: strip_namespace(path, &ns).to_string(),
                    uuid: String::new(),
                    value,
                };
                self.transmit(remote, &msg);
            }
        }
        Ok(())
    }

    fn subscribe_inner(&mut self, path: &str, sink: Sink, uuid: Option<String>) -> Result<String> {
        let uuid = self.uuid_or_generate(uuid);
        match self.parse_namespace(path) {
            None => {
                let segments = to_segments(path)?;
                self.subscriptions.push(Subscription {
                    path: path.to_string(),
                    uuid: uuid.clone(),
                    scope: Scope::Local { segments },
                    sink,
                });
            }
            Some(ns) => {
                let remote = self.remotes[&ns].id;
                let stripped = strip_namespace(path, &ns).to_string();
                let msg = Message {
                    kind: MessageKind::Subscribe,
                    path: stripped.clone(),
                    uuid: uuid.clone(),
                    value: Value::Null,
                };
                self.transmit(remote, &msg);
                self.subscriptions.push(Subscription {
                    path: stripped,
                    uuid: uuid.clone(),
                    scope: Scope::Remote { remote },
                    sink,
                });
            }
        }
        Ok(uuid)
    }

    /// Deliver events to every local subscription whose watched prefix
    /// matches the written path. The matching records are snapshotted
    /// first so a callback may re-enter the store and reshape the registry
    /// mid-fan-out; each event reads the watched prefix's value at
    /// delivery time.
    fn fan_out(&mut self, written: &str) {
        let matched: Vec<(Sink, String, String, Vec<String>)> = self
            .subscriptions
            .iter()
            .filter_map(|sub| match &sub.scope {
                Scope::Local { segments } if prefix_matches(written, &sub.path) => Some((
                    sub.sink.clone(),
                    sub.path.clone(),
                    sub.uuid.clone(),
                    segments.clone(),
                )),
                _ => None,
            })
            .collect();

        for (sink, path, uuid, segments) in matched {
            let value = tree::read(&self.data, &segments)
                .cloned()
                .unwrap_or(Value::Null);
            let msg = Message {
                kind: MessageKind::Event,
                path,
                uuid,
                value,
            };
            self.deliver_event(sink, &msg);
        }
    }

    fn deliver_reply(&mut self, reply: Reply, msg: &Message) {
        match reply {
            Reply::Callback(callback) => callback(self, msg),
            Reply::Remote(id) => self.transmit(id, msg),
        }
    }

    fn deliver_event(&mut self, sink: Sink, msg: &Message) {
        match sink {
            Sink::Local(callback) => callback(self, msg),
            Sink::Forward(id) => self.transmit(id, msg),
        }
    }
}

impl Default for Datastore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore")
            .field("remotes", &self.remotes.keys().collect::<Vec<_>>())
            .field("pending_requests", &self.requests.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

/// Uuid gate first, then the directional prefix test; local records only
/// match paths with no namespace, remote records only match paths whose
/// namespace resolves to their own remote.
fn unsubscribe_matches(
    sub: &Subscription,
    path: &str,
    uuid: Option<&str>,
    ns: Option<&str>,
    remote_id: Option<RemoteId>,
) -> bool {
    if let Some(uuid) = uuid {
        if !uuid.is_empty() && uuid != sub.uuid {
            return false;
        }
    }
    match &sub.scope {
        Scope::Local { .. } => ns.is_none() && prefix_matches(path, &sub.path),
        Scope::Remote { remote } => match (ns, remote_id) {
            (Some(ns), Some(id)) if *remote == id => {
                prefix_matches(path, &format!("{ns}.{}", sub.path))
            }
            _ => false,
        },
    }
}
