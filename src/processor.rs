//! Interfaces the stub requires from its host emulator.
//!
//! The stub never owns guest execution. Pausing, stepping, patching
//! breakpoints into translated code and walking guest heaps all belong to the
//! emulator; the traits here are the seam between the two.

use crate::address::{GuestAddress, HostAddress};
use std::sync::Arc;

/// Execution state of the guest as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    Paused,
    Ended,
}

/// PowerPC register context captured while a thread is paused.
#[derive(Debug, Clone, Default)]
pub struct PpcContext {
    pub r: [u64; 32],
    pub f: [f64; 32],
    pub lr: u64,
    pub ctr: u64,
    pub cr: u32,
}

/// One frame of a thread's call stack.
///
/// Frames executing host-only code carry no guest PC.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallFrame {
    pub guest_pc: Option<GuestAddress>,
}

/// Point-in-time debug view of one guest thread.
#[derive(Debug, Clone)]
pub struct ThreadSnapshot {
    pub id: u32,
    pub name: String,
    pub context: PpcContext,
    pub frames: Vec<CallFrame>,
}

/// Memory protection attributes of a mapped guest range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protection {
    pub read: bool,
    pub write: bool,
}

/// One guest heap, looked up through [`Memory`].
pub trait Heap {
    /// Protection of the page range containing `addr`, `None` if unmapped.
    fn protection(&self, addr: GuestAddress) -> Option<Protection>;

    /// Copy guest memory starting at `addr` into `buf`.
    ///
    /// Returns `false` if the requested range leaves the heap.
    fn read(&self, addr: GuestAddress, buf: &mut [u8]) -> bool;
}

/// Guest virtual memory, a set of heaps addressed by guest address.
pub trait Memory {
    fn heap_containing(&self, addr: GuestAddress) -> Option<&dyn Heap>;
}

/// A breakpoint constructed by the processor but owned by the stub.
///
/// The processor resolves the guest address to every native patch site at
/// construction time; the sites stay fixed for the handle's lifetime.
pub trait BreakpointHandle: Send {
    fn guest_address(&self) -> GuestAddress;
    fn host_addresses(&self) -> Vec<HostAddress>;
}

/// Guest CPU collaborator.
pub trait Processor {
    type Breakpoint: BreakpointHandle;

    fn execution_state(&self) -> ExecutionState;

    fn pause(&self) -> anyhow::Result<()>;
    fn resume(&self) -> anyhow::Result<()>;
    fn step_guest_instruction(&self, thread_id: u32) -> anyhow::Result<()>;

    /// Snapshots of every guest thread. Only meaningful while paused.
    fn query_thread_debug_infos(&self) -> Vec<ThreadSnapshot>;

    fn create_breakpoint(&self, addr: GuestAddress) -> Self::Breakpoint;
    fn add_breakpoint(&self, bp: &Self::Breakpoint);
    fn remove_breakpoint(&self, bp: &Self::Breakpoint);

    fn memory(&self) -> &dyn Memory;
}

/// A loaded guest module.
pub trait GuestModule: Send + Sync {
    fn name(&self) -> &str;
}

/// Kernel collaborator, queried for the module listing while paused.
pub trait Kernel {
    /// Modules currently loaded into the guest.
    ///
    /// Returned references are held strongly by the session for as long as
    /// they appear in its snapshot, so none unload mid-inspection.
    fn loaded_modules(&self) -> Vec<Arc<dyn GuestModule>>;
}
