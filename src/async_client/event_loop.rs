//! Event loop contract
//!
//! The capabilities an embedding reactor must provide. No reactor is
//! bundled; anything that can watch a descriptor for readiness and call a
//! closure back will do.

use std::fmt;
use std::io;
use std::os::unix::io::RawFd;

/// Readiness direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Readable,
    Writable,
}

/// Opaque token for one registration, chosen by the reactor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterestHandle(u64);

impl InterestHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InterestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Called by the reactor each time the registered descriptor is ready
pub type ReadyHandler = Box<dyn FnMut()>;

/// A single-threaded readiness reactor
///
/// Methods take `&self` because they are called re-entrantly: a handler
/// invoked from inside `run` may register, unregister, or stop. An
/// implementation must not hold internal borrows across a handler call.
pub trait EventLoop {
    /// Start calling `handler` whenever `fd` is ready for `interest`
    fn register(
        &self,
        fd: RawFd,
        interest: Interest,
        handler: ReadyHandler,
    ) -> io::Result<InterestHandle>;

    /// Stop delivering events for `handle`. Unknown handles are ignored.
    fn unregister(&self, handle: InterestHandle);

    /// Dispatch readiness events until `stop` is called
    fn run(&self) -> io::Result<()>;

    /// Make `run` return after the current dispatch
    fn stop(&self);
}
