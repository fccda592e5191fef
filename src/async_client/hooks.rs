//! Client hooks
//!
//! Overridable callback slots binding an `AsyncClient` to its reactor.
//!
//! ## Defaults
//! - `add_read` / `add_write`: register a handler that calls
//!   `handle_read` / `handle_write` on the client
//! - `del_read` / `del_write`: unregister the handle. A registration is
//!   always released by the del hook installed when it was created, also
//!   when the client is dropped, so these hooks receive no client.
//! - `on_connect`: stop the loop if the connection attempt failed
//! - `on_disconnect`: stop the loop
//!
//! Hooks must not call back into the client's interest management; they
//! may queue commands or disconnect from the lifecycle hooks.

use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;

use crate::error::RedwireError;

use super::{AsyncClient, EventLoop, Interest, InterestHandle};

/// Registers interest for the client's descriptor and returns the handle
pub type AddInterestHook =
    Rc<dyn Fn(&AsyncClient, &dyn EventLoop, RawFd) -> io::Result<InterestHandle>>;

/// Releases a handle previously returned by the matching add hook
pub type DelInterestHook = Rc<dyn Fn(&dyn EventLoop, InterestHandle)>;

/// Connect or disconnect notification; `Err` carries the cause
pub type StatusHook = Rc<dyn Fn(&AsyncClient, &dyn EventLoop, Result<(), &RedwireError>)>;

/// The six hook slots of an async client
#[derive(Clone)]
pub struct Hooks {
    pub(super) add_read: AddInterestHook,
    pub(super) del_read: DelInterestHook,
    pub(super) add_write: AddInterestHook,
    pub(super) del_write: DelInterestHook,
    pub(super) on_connect: StatusHook,
    pub(super) on_disconnect: StatusHook,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            add_read: Rc::new(register_read),
            del_read: Rc::new(unregister),
            add_write: Rc::new(register_write),
            del_write: Rc::new(unregister),
            on_connect: Rc::new(stop_on_failed_connect),
            on_disconnect: Rc::new(stop_on_disconnect),
        }
    }
}

fn register_read(client: &AsyncClient, event_loop: &dyn EventLoop, fd: RawFd) -> io::Result<InterestHandle> {
    event_loop.register(fd, Interest::Readable, client.readiness_handler(Interest::Readable))
}

fn register_write(client: &AsyncClient, event_loop: &dyn EventLoop, fd: RawFd) -> io::Result<InterestHandle> {
    event_loop.register(fd, Interest::Writable, client.readiness_handler(Interest::Writable))
}

fn unregister(event_loop: &dyn EventLoop, handle: InterestHandle) {
    event_loop.unregister(handle);
}

fn stop_on_failed_connect(_: &AsyncClient, event_loop: &dyn EventLoop, status: Result<(), &RedwireError>) {
    if status.is_err() {
        event_loop.stop();
    }
}

fn stop_on_disconnect(_: &AsyncClient, event_loop: &dyn EventLoop, _: Result<(), &RedwireError>) {
    event_loop.stop();
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_read<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AsyncClient, &dyn EventLoop, RawFd) -> io::Result<InterestHandle> + 'static,
    {
        self.add_read = Rc::new(hook);
        self
    }

    pub fn del_read<F>(mut self, hook: F) -> Self
    where
        F: Fn(&dyn EventLoop, InterestHandle) + 'static,
    {
        self.del_read = Rc::new(hook);
        self
    }

    pub fn add_write<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AsyncClient, &dyn EventLoop, RawFd) -> io::Result<InterestHandle> + 'static,
    {
        self.add_write = Rc::new(hook);
        self
    }

    pub fn del_write<F>(mut self, hook: F) -> Self
    where
        F: Fn(&dyn EventLoop, InterestHandle) + 'static,
    {
        self.del_write = Rc::new(hook);
        self
    }

    pub fn on_connect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AsyncClient, &dyn EventLoop, Result<(), &RedwireError>) + 'static,
    {
        self.on_connect = Rc::new(hook);
        self
    }

    pub fn on_disconnect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AsyncClient, &dyn EventLoop, Result<(), &RedwireError>) + 'static,
    {
        self.on_disconnect = Rc::new(hook);
        self
    }

    pub(super) fn add_hook(&self, interest: Interest) -> AddInterestHook {
        match interest {
            Interest::Readable => self.add_read.clone(),
            Interest::Writable => self.add_write.clone(),
        }
    }

    pub(super) fn del_hook(&self, interest: Interest) -> DelInterestHook {
        match interest {
            Interest::Readable => self.del_read.clone(),
            Interest::Writable => self.del_write.clone(),
        }
    }
}
