//! Snapshot of the debuggee taken while guest execution is paused.

use crate::address::GuestAddress;
use crate::breakpoint::BreakpointRegistry;
use crate::processor::{ExecutionState, GuestModule, Kernel, Processor, ThreadSnapshot};
use std::sync::Arc;

/// Everything a debugger session knows about the guest between two
/// execution-state transitions.
///
/// Refreshed on connect and on every processor event. While the guest runs,
/// thread and module fields keep their last paused-state values and must not
/// be consulted; dispatch only reads them when the guest is stopped.
pub struct SessionCache<B> {
    pub is_stopped: bool,
    pub threads: Vec<ThreadSnapshot>,
    /// Held strongly so no module unloads while the debugger inspects it.
    pub modules: Vec<Arc<dyn GuestModule>>,
    /// Thread the client focuses with `H`.
    pub cur_thread_id: Option<u32>,
    /// Thread that most recently stopped, the target for stepping.
    pub last_bp_thread_id: Option<u32>,
    /// One-shot: the session loop owes the client a stop reply.
    pub notify_stopped: bool,
    /// One-shot: thread to report in the pending stop reply.
    pub notify_bp_thread_id: Option<u32>,
    /// One-shot: breakpoint site to report as PC, consumed by the first PC
    /// read after the stop.
    pub notify_bp_guest_address: Option<GuestAddress>,
    pub breakpoints: BreakpointRegistry<B>,
}

impl<B> Default for SessionCache<B> {
    fn default() -> Self {
        SessionCache {
            is_stopped: false,
            threads: vec![],
            modules: vec![],
            cur_thread_id: None,
            last_bp_thread_id: None,
            notify_stopped: false,
            notify_bp_thread_id: None,
            notify_bp_guest_address: None,
            breakpoints: BreakpointRegistry::default(),
        }
    }
}

impl<B> SessionCache<B> {
    /// Reload the snapshot from the processor and kernel.
    pub fn refresh<P, K>(&mut self, processor: &P, kernel: &K)
    where
        P: Processor<Breakpoint = B>,
        K: Kernel + ?Sized,
    {
        self.is_stopped = processor.execution_state() != ExecutionState::Running;
        self.notify_stopped = self.is_stopped;
        if !self.is_stopped {
            // Still running: the rest of the data is kept stale on purpose.
            return;
        }

        self.modules = kernel.loaded_modules();
        self.threads = processor.query_thread_debug_infos();

        let focus_alive = self
            .cur_thread_id
            .is_some_and(|id| self.thread(id).is_some());
        if !focus_alive {
            self.cur_thread_id = self.threads.first().map(|thread| thread.id);
        }
    }

    pub fn thread(&self, id: u32) -> Option<&ThreadSnapshot> {
        self.threads.iter().find(|thread| thread.id == id)
    }

    pub fn cur_thread(&self) -> Option<&ThreadSnapshot> {
        self.cur_thread_id.and_then(|id| self.thread(id))
    }
}
