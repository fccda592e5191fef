//! Async client
//!
//! Non-blocking connection driven by reactor readiness events.
//!
//! ## Concurrency Model: single loop thread
//!
//! - All state lives behind `Rc<RefCell<..>>`, so the client is `!Send` and
//!   every handler and callback runs on the thread owning the event loop
//! - No borrow is held while user code (callbacks, hooks) runs, so a
//!   callback may queue more commands or disconnect
//! - Callbacks fire strictly in submission order, one per reply, however
//!   the bytes were fragmented across readiness events

use std::cell::{Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::{Rc, Weak};

use bytes::{Buf, BytesMut};

use crate::config::Config;
use crate::connection::{ConnectionState, Transport};
use crate::error::{RedwireError, Result};
use crate::protocol::{encode_command, CommandRequest, ReplyDecoder, ReplyValue};

use super::hooks::DelInterestHook;
use super::pubsub::{self, Namespace, Push, Subscription, SubscriptionCallback};
use super::{EventLoop, Hooks, Interest, InterestHandle, ReadyHandler};

/// Completion callback for one queued command
pub type ReplyCallback = Box<dyn FnOnce(&AsyncClient, ReplyValue)>;

/// One entry per request still waiting for its reply, oldest first
enum Pending {
    Reply(Option<ReplyCallback>),

    /// Holds the head of the FIFO until `remaining` confirmations arrived
    /// (one per channel, one for MONITOR)
    Subscribe {
        callback: SubscriptionCallback,
        monitor: bool,
        remaining: usize,
    },

    /// `remaining` is `None` for the argument-less form, which ends once
    /// `namespace` is empty. The callback gets the final confirmation.
    Unsubscribe {
        namespace: Namespace,
        remaining: Option<usize>,
        callback: Option<ReplyCallback>,
    },
}

/// A live registration and the hook that releases it
struct Registration {
    handle: InterestHandle,
    release: DelInterestHook,
}

/// Mutable connection state, only touched in short borrows
struct State {
    conn_state: ConnectionState,

    /// Set once the client has been disconnected or failed; never cleared
    terminated: bool,

    transport: Option<Transport>,
    fd: Option<RawFd>,

    /// Encoded requests not yet accepted by the socket
    write_buf: BytesMut,

    /// Scratch space for socket reads
    read_buf: Vec<u8>,

    decoder: ReplyDecoder,

    pending: VecDeque<Pending>,

    subscription: Option<Subscription>,

    read_interest: Option<Registration>,
    write_interest: Option<Registration>,

    /// Peer address for logging
    peer_addr: String,
}

impl State {
    fn interest_mut(&mut self, interest: Interest) -> &mut Option<Registration> {
        match interest {
            Interest::Readable => &mut self.read_interest,
            Interest::Writable => &mut self.write_interest,
        }
    }

    /// Decide who receives `reply`
    fn route(&mut self, reply: ReplyValue) -> Delivery {
        let push = Push::parse(&reply);

        if self.subscription.as_ref().is_some_and(Subscription::is_monitor) {
            return self.unclaimed(reply, None);
        }

        match self.pending.pop_front() {
            Some(Pending::Reply(callback)) if push.is_none() || self.subscription.is_none() => {
                match callback {
                    Some(callback) => Delivery::Callback(callback, reply),
                    None => Delivery::Discard,
                }
            }

            Some(Pending::Subscribe {
                callback,
                monitor,
                remaining,
            }) => {
                if reply.is_error() {
                    return Delivery::Subscription(callback, reply);
                }
                if !monitor && !matches!(push, Some(Push::Subscribed { .. })) {
                    self.pending.push_front(Pending::Subscribe {
                        callback,
                        monitor,
                        remaining,
                    });
                    return self.unclaimed(reply, push.as_ref());
                }

                if let Some(subscription) = self.subscription.as_mut() {
                    subscription.set_callback(Rc::clone(&callback));
                } else {
                    tracing::debug!("Push mode started on {}", self.peer_addr);
                    self.subscription = Some(Subscription::new(Rc::clone(&callback), monitor));
                }
                if let (Some(subscription), Some(push)) = (self.subscription.as_mut(), &push) {
                    subscription.track(push);
                }

                if remaining > 1 {
                    self.pending.push_front(Pending::Subscribe {
                        callback: Rc::clone(&callback),
                        monitor,
                        remaining: remaining - 1,
                    });
                }
                Delivery::Subscription(callback, reply)
            }

            Some(Pending::Unsubscribe {
                namespace,
                remaining,
                callback,
            }) => {
                let Some(confirmation @ Push::Unsubscribed { name, .. }) = &push else {
                    if reply.is_error() {
                        return match callback {
                            Some(callback) => Delivery::Callback(callback, reply),
                            None => Delivery::Discard,
                        };
                    }
                    self.pending.push_front(Pending::Unsubscribe {
                        namespace,
                        remaining,
                        callback,
                    });
                    return self.unclaimed(reply, push.as_ref());
                };

                let (subscription, ended) = match self.subscription.as_mut() {
                    Some(subscription) => {
                        (Some(subscription.callback()), subscription.track(confirmation))
                    }
                    None => (None, true),
                };
                let finished = match remaining {
                    Some(n) => n <= 1,
                    None => {
                        name.is_none()
                            || ended
                            || self
                                .subscription
                                .as_ref()
                                .map_or(true, |s| s.is_empty(namespace))
                    }
                };
                if ended && self.subscription.take().is_some() {
                    tracing::debug!("Push mode ended on {}", self.peer_addr);
                }

                if finished {
                    Delivery::Unsubscribed {
                        subscription,
                        callback,
                        reply,
                    }
                } else {
                    self.pending.push_front(Pending::Unsubscribe {
                        namespace,
                        remaining: remaining.map(|n| n - 1),
                        callback,
                    });
                    Delivery::Unsubscribed {
                        subscription,
                        callback: None,
                        reply,
                    }
                }
            }

            Some(head) => {
                self.pending.push_front(head);
                self.unclaimed(reply, push.as_ref())
            }

            None => self.unclaimed(reply, push.as_ref()),
        }
    }

    /// Route a reply no pending request owns: pushes go to the active
    /// subscription, anything else is dropped
    fn unclaimed(&mut self, reply: ReplyValue, push: Option<&Push>) -> Delivery {
        let Some(subscription) = self.subscription.as_mut() else {
            tracing::warn!(
                "Discarding reply from {} with no pending request: {}",
                self.peer_addr,
                reply
            );
            return Delivery::Discard;
        };

        let callback = subscription.callback();
        if push.is_some_and(|push| subscription.track(push)) {
            self.subscription = None;
            tracing::debug!("Push mode ended on {}", self.peer_addr);
        }
        Delivery::Subscription(callback, reply)
    }
}

struct Shared {
    config: Config,
    event_loop: Rc<dyn EventLoop>,
    hooks: RefCell<Hooks>,
    state: RefCell<State>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Handlers hold weak references, so a dropped client only leaves
        // stale registrations behind; release them through the hooks that
        // created them.
        let state = self.state.get_mut();
        for registration in [state.read_interest.take(), state.write_interest.take()]
            .into_iter()
            .flatten()
        {
            (registration.release)(&*self.event_loop, registration.handle);
        }
    }
}

/// What to do with one decoded reply
enum Delivery {
    Callback(ReplyCallback, ReplyValue),
    Subscription(SubscriptionCallback, ReplyValue),
    Unsubscribed {
        subscription: Option<SubscriptionCallback>,
        callback: Option<ReplyCallback>,
        reply: ReplyValue,
    },
    Discard,
}

/// Non-blocking client bound to an external event loop
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct AsyncClient {
    shared: Rc<Shared>,
}

impl AsyncClient {
    /// Create a disconnected client; call [`connect`](Self::connect) next
    pub fn new(config: Config, event_loop: Rc<dyn EventLoop>, hooks: Hooks) -> Self {
        let state = State {
            conn_state: ConnectionState::Disconnected,
            terminated: false,
            transport: None,
            fd: None,
            write_buf: BytesMut::with_capacity(4 * 1024),
            read_buf: vec![0u8; config.read_chunk_size],
            decoder: ReplyDecoder::with_limits(config.decoder_limits),
            pending: VecDeque::new(),
            subscription: None,
            read_interest: None,
            write_interest: None,
            peer_addr: config.endpoint.to_string(),
        };

        Self {
            shared: Rc::new(Shared {
                config,
                event_loop,
                hooks: RefCell::new(hooks),
                state: RefCell::new(state),
            }),
        }
    }

    /// Create a client over an already connected transport and start it
    ///
    /// Behaves like a successful [`connect`](Self::connect).
    pub fn with_transport(
        transport: Transport,
        config: Config,
        event_loop: Rc<dyn EventLoop>,
        hooks: Hooks,
    ) -> Result<Self> {
        let client = Self::new(config, event_loop, hooks);
        client.state_mut().conn_state = ConnectionState::Connecting;
        client.establish(Ok(transport))?;
        Ok(client)
    }

    /// Connect to the configured endpoint
    ///
    /// The socket is opened with a blocking connect on the calling thread
    /// and switched to non-blocking mode afterwards, so the loop is stalled
    /// for the duration of the attempt. The connect hook receives
    /// the outcome. On success read interest is registered, plus write
    /// interest if commands were queued beforehand.
    pub fn connect(&self) -> Result<()> {
        {
            let mut state = self.state_mut();
            if state.terminated {
                return Err(RedwireError::NotConnected);
            }
            if state.conn_state != ConnectionState::Disconnected {
                return Ok(());
            }
            state.conn_state = ConnectionState::Connecting;
        }

        tracing::debug!("Connecting to {}", self.shared.config.endpoint);
        let transport = self.shared.config.endpoint.connect(&self.shared.config);
        self.establish(transport)
    }

    fn establish(&self, transport: Result<Transport>) -> Result<()> {
        let transport = transport.and_then(|t| {
            t.set_nonblocking(true)?;
            Ok(t)
        });

        let transport = match transport {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("Failed to connect to {}: {}", self.shared.config.endpoint, e);
                {
                    let mut state = self.state_mut();
                    state.conn_state = ConnectionState::ClosedWithError;
                    state.terminated = true;
                }
                let pending = std::mem::take(&mut self.state_mut().pending);
                drop(pending);
                self.fire_connect(Err(&e));
                return Err(e);
            }
        };

        let has_output = {
            let mut state = self.state_mut();
            state.fd = Some(transport.as_raw_fd());
            state.peer_addr = transport.peer_description();
            state.transport = Some(transport);
            state.conn_state = ConnectionState::Connected;
            tracing::debug!("Connection established to {}", state.peer_addr);
            !state.write_buf.is_empty()
        };

        let registered = self.add_interest(Interest::Readable).and_then(|_| {
            if has_output {
                self.add_interest(Interest::Writable)
            } else {
                Ok(())
            }
        });
        if let Err(e) = registered {
            self.fail(&e);
            return Err(e);
        }

        self.fire_connect(Ok(()));
        Ok(())
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Queue a command whose reply is discarded
    ///
    /// SUBSCRIBE, PSUBSCRIBE and MONITOR must go through
    /// [`subscribe`](Self::subscribe).
    pub fn queue(&self, command: impl Into<CommandRequest>) -> Result<()> {
        self.enqueue(command.into(), None)
    }

    /// Queue a command and call `callback` with its reply
    ///
    /// For UNSUBSCRIBE and PUNSUBSCRIBE the callback receives the last
    /// confirmation the command produces.
    pub fn queue_with<F>(&self, command: impl Into<CommandRequest>, callback: F) -> Result<()>
    where
        F: FnOnce(&AsyncClient, ReplyValue) + 'static,
    {
        self.enqueue(command.into(), Some(Box::new(callback)))
    }

    /// Send SUBSCRIBE, PSUBSCRIBE or MONITOR and route pushes to `callback`
    ///
    /// Push mode starts when the server confirms the subscription, so
    /// replies to earlier commands still reach their own callbacks. It ends
    /// when an unsubscribe confirmation reports no remaining subscriptions.
    /// While subscribed, the most recent subscribe callback receives every
    /// push.
    pub fn subscribe<F>(&self, command: impl Into<CommandRequest>, callback: F) -> Result<()>
    where
        F: FnMut(&AsyncClient, ReplyValue) + 'static,
    {
        let command = command.into();
        if !pubsub::starts_push(&command) {
            return Err(RedwireError::TypeMismatch(format!(
                "{} does not start a subscription",
                String::from_utf8_lossy(command.name())
            )));
        }
        let entry = Pending::Subscribe {
            callback: Rc::new(RefCell::new(callback)),
            monitor: command.is("MONITOR"),
            remaining: command.len().saturating_sub(1).max(1),
        };
        self.submit(command, entry)
    }

    fn enqueue(&self, command: CommandRequest, callback: Option<ReplyCallback>) -> Result<()> {
        if pubsub::starts_push(&command) {
            return Err(RedwireError::TypeMismatch(format!(
                "{} needs a subscription callback",
                String::from_utf8_lossy(command.name())
            )));
        }

        let entry = match pubsub::unsubscribe_namespace(&command) {
            Some(namespace) => Pending::Unsubscribe {
                namespace,
                remaining: match command.len().saturating_sub(1) {
                    0 => None,
                    n => Some(n),
                },
                callback,
            },
            None => Pending::Reply(callback),
        };
        self.submit(command, entry)
    }

    fn submit(&self, command: CommandRequest, entry: Pending) -> Result<()> {
        let needs_write = {
            let mut state = self.state_mut();
            if state.terminated {
                return Err(RedwireError::NotConnected);
            }

            encode_command(&command, &mut state.write_buf)?;
            state.pending.push_back(entry);

            tracing::trace!(
                "Queued {} for {} ({} pending)",
                String::from_utf8_lossy(command.name()),
                state.peer_addr,
                state.pending.len()
            );

            state.conn_state == ConnectionState::Connected && state.write_interest.is_none()
        };

        if needs_write {
            if let Err(e) = self.add_interest(Interest::Writable) {
                self.fail(&e);
                return Err(e);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Readiness
    // =========================================================================

    /// Write buffered requests; called on write readiness
    ///
    /// Write interest is dropped once the buffer drains.
    pub fn handle_write(&self) {
        let result = {
            let mut state = self.state_mut();
            let State {
                transport,
                write_buf,
                ..
            } = &mut *state;
            let Some(transport) = transport.as_mut() else {
                return;
            };
            flush_nonblocking(transport, write_buf)
        };

        match result {
            Ok(true) => self.remove_interest(Interest::Writable),
            Ok(false) => {}
            Err(e) => self.fail(&e),
        }
    }

    /// Read available bytes and dispatch every complete reply; called on
    /// read readiness
    pub fn handle_read(&self) {
        let result = {
            let mut state = self.state_mut();
            let State {
                transport,
                decoder,
                read_buf,
                ..
            } = &mut *state;
            let Some(transport) = transport.as_mut() else {
                return;
            };
            fill_decoder(transport, decoder, read_buf)
        };

        // Replies that arrived before a close are still delivered.
        self.dispatch();

        if let Err(e) = result {
            self.fail(&e);
        }
    }

    fn dispatch(&self) {
        let status_mode = self.shared.config.reply_mode.status;

        loop {
            let delivery = {
                let mut state = self.state_mut();
                if state.conn_state != ConnectionState::Connected {
                    return;
                }

                let reply = match state.decoder.decode() {
                    Ok(Some(reply)) => reply.apply_status_mode(status_mode),
                    Ok(None) => return,
                    Err(e) => {
                        drop(state);
                        self.fail(&e);
                        return;
                    }
                };

                state.route(reply)
            };

            match delivery {
                Delivery::Callback(callback, reply) => callback(self, reply),
                Delivery::Subscription(callback, reply) => {
                    let mut callback = callback.borrow_mut();
                    (*callback)(self, reply)
                }
                Delivery::Unsubscribed {
                    subscription,
                    callback,
                    reply,
                } => {
                    if let Some(subscription) = subscription {
                        let mut subscription = subscription.borrow_mut();
                        (*subscription)(self, reply.clone());
                    }
                    if let Some(callback) = callback {
                        callback(self, reply);
                    }
                }
                Delivery::Discard => {}
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Drop interest, close the transport and forget pending callbacks
    ///
    /// Pending callbacks are never invoked. The disconnect hook then fires
    /// with `Ok(())`; by default it stops the loop.
    pub fn disconnect(&self) {
        self.teardown(ConnectionState::Disconnected, None);
    }

    /// Swap the hooks, moving live registrations from the old hooks to the
    /// new ones
    pub fn replace_hooks(&self, hooks: Hooks) {
        let (had_read, had_write) = {
            let state = self.inner();
            (state.read_interest.is_some(), state.write_interest.is_some())
        };
        self.remove_interest(Interest::Readable);
        self.remove_interest(Interest::Writable);

        *self.shared.hooks.borrow_mut() = hooks;

        let mut result = Ok(());
        if had_read {
            result = self.add_interest(Interest::Readable);
        }
        if had_write && result.is_ok() {
            result = self.add_interest(Interest::Writable);
        }
        if let Err(e) = result {
            self.fail(&e);
        }
    }

    fn fail(&self, err: &RedwireError) {
        if self.inner().terminated {
            return;
        }
        match err {
            RedwireError::Eof => {
                tracing::debug!("Server {} closed the connection", self.inner().peer_addr)
            }
            other => tracing::warn!("Connection to {} failed: {}", self.inner().peer_addr, other),
        }
        self.teardown(ConnectionState::ClosedWithError, Some(err));
    }

    fn teardown(&self, final_state: ConnectionState, err: Option<&RedwireError>) {
        {
            let mut state = self.state_mut();
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.conn_state = ConnectionState::Closing;
        }

        self.remove_interest(Interest::Readable);
        self.remove_interest(Interest::Writable);

        let (transport, pending, subscription) = {
            let mut state = self.state_mut();
            state.fd = None;
            state.write_buf.clear();
            state.decoder.reset();
            state.conn_state = final_state;
            (
                state.transport.take(),
                std::mem::take(&mut state.pending),
                state.subscription.take(),
            )
        };

        if let Some(transport) = transport {
            let _ = transport.shutdown();
        }
        if !pending.is_empty() {
            tracing::debug!("Dropping {} pending callbacks", pending.len());
        }
        // Callbacks may own client handles; drop them outside any borrow.
        drop(pending);
        drop(subscription);

        tracing::debug!("Client for {} is now {}", self.inner().peer_addr, final_state);

        let hook = self.shared.hooks.borrow().on_disconnect.clone();
        let status = match err {
            Some(e) => Err(e),
            None => Ok(()),
        };
        hook(self, &*self.shared.event_loop, status);
    }

    // =========================================================================
    // Interest management
    // =========================================================================

    /// A handler that forwards readiness for `interest` to this client
    ///
    /// Holds only a weak reference, so a registered handler never keeps the
    /// client alive. Custom `add_*` hooks can pass it to their reactor.
    pub fn readiness_handler(&self, interest: Interest) -> ReadyHandler {
        let weak: Weak<Shared> = Rc::downgrade(&self.shared);
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                let client = AsyncClient { shared };
                match interest {
                    Interest::Readable => client.handle_read(),
                    Interest::Writable => client.handle_write(),
                }
            }
        })
    }

    fn add_interest(&self, interest: Interest) -> Result<()> {
        let fd = {
            let mut state = self.state_mut();
            let Some(fd) = state.fd else {
                return Ok(());
            };
            if state.interest_mut(interest).is_some() {
                return Ok(());
            }
            fd
        };

        let (add, release) = {
            let hooks = self.shared.hooks.borrow();
            (hooks.add_hook(interest), hooks.del_hook(interest))
        };
        let handle = add(self, &*self.shared.event_loop, fd)?;
        tracing::trace!("Registered {:?} interest on fd {} as {}", interest, fd, handle);
        *self.state_mut().interest_mut(interest) = Some(Registration { handle, release });
        Ok(())
    }

    fn remove_interest(&self, interest: Interest) {
        let Some(Registration { handle, release }) = self.state_mut().interest_mut(interest).take()
        else {
            return;
        };
        release(&*self.shared.event_loop, handle);
        tracing::trace!("Released {:?} interest {}", interest, handle);
    }

    fn fire_connect(&self, status: std::result::Result<(), &RedwireError>) {
        let hook = self.shared.hooks.borrow().on_connect.clone();
        hook(self, &*self.shared.event_loop, status);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> ConnectionState {
        self.inner().conn_state
    }

    /// Number of queued requests still waiting for a reply
    pub fn pending(&self) -> usize {
        self.inner().pending.len()
    }

    /// Whether a confirmed subscription is routing pushes to its callback
    pub fn is_subscribed(&self) -> bool {
        self.inner().subscription.is_some()
    }

    /// Whether write interest is currently registered
    pub fn wants_write(&self) -> bool {
        self.inner().write_interest.is_some()
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> String {
        self.inner().peer_addr.clone()
    }

    fn inner(&self) -> Ref<'_, State> {
        self.shared.state.borrow()
    }

    fn state_mut(&self) -> RefMut<'_, State> {
        self.shared.state.borrow_mut()
    }
}

/// Write until the buffer drains (`Ok(true)`) or the socket is full
/// (`Ok(false)`)
fn flush_nonblocking(transport: &mut Transport, write_buf: &mut BytesMut) -> Result<bool> {
    while !write_buf.is_empty() {
        match transport.write(&write_buf[..]) {
            Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero).into()),
            Ok(n) => write_buf.advance(n),
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// Read until the socket would block, feeding the decoder
fn fill_decoder(
    transport: &mut Transport,
    decoder: &mut ReplyDecoder,
    read_buf: &mut [u8],
) -> Result<()> {
    loop {
        match transport.read(read_buf) {
            Ok(0) => return Err(RedwireError::Eof),
            Ok(n) => decoder.feed(&read_buf[..n]),
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
}
