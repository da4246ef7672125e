//! Code breakpoint registry.

use crate::address::{GuestAddress, HostAddress};
use crate::processor::{BreakpointHandle, Processor};
use log::debug;
use std::collections::{HashMap, HashSet};

struct Registered<B> {
    handle: B,
    host_addresses: Vec<HostAddress>,
}

/// Active code breakpoints keyed by guest address.
///
/// Two uniqueness rules hold at all times: one breakpoint per guest address,
/// and no native patch site shared between breakpoints. The host side is
/// tracked in a secondary set so collision checks stay O(1).
pub struct BreakpointRegistry<B> {
    by_guest_address: HashMap<GuestAddress, Registered<B>>,
    host_index: HashSet<HostAddress>,
}

impl<B> Default for BreakpointRegistry<B> {
    fn default() -> Self {
        BreakpointRegistry {
            by_guest_address: HashMap::new(),
            host_index: HashSet::new(),
        }
    }
}

impl<B: BreakpointHandle> BreakpointRegistry<B> {
    /// Construct a breakpoint through the processor and register it.
    ///
    /// Returns `false` on a guest or host address collision; the existing
    /// breakpoint wins and the new one is discarded uninstalled.
    pub fn insert<P>(&mut self, processor: &P, addr: GuestAddress) -> bool
    where
        P: Processor<Breakpoint = B>,
    {
        if self.by_guest_address.contains_key(&addr) {
            debug!("breakpoint at {addr} already exists");
            return false;
        }

        let handle = processor.create_breakpoint(addr);
        let host_addresses = handle.host_addresses();
        if host_addresses
            .iter()
            .any(|host| self.host_index.contains(host))
        {
            debug!("breakpoint at {addr} collides with an installed patch site");
            return false;
        }

        debug!("adding breakpoint at {addr}");
        processor.add_breakpoint(&handle);
        self.host_index.extend(host_addresses.iter().copied());
        self.by_guest_address.insert(
            addr,
            Registered {
                handle,
                host_addresses,
            },
        );
        true
    }

    /// Uninstall and drop the breakpoint at `addr`. Does nothing if absent.
    ///
    /// The processor patch is pulled before the registry entry so a hit
    /// firing mid-removal still resolves to a registered breakpoint.
    pub fn remove<P>(&mut self, processor: &P, addr: GuestAddress)
    where
        P: Processor<Breakpoint = B>,
    {
        let Some(registered) = self.by_guest_address.get(&addr) else {
            return;
        };
        debug!("deleting breakpoint at {addr}");
        processor.remove_breakpoint(&registered.handle);

        let registered = self
            .by_guest_address
            .remove(&addr)
            .expect("present, checked above");
        for host in &registered.host_addresses {
            self.host_index.remove(host);
        }
    }

    /// Uninstall everything, used on detach and disconnect.
    pub fn remove_all<P>(&mut self, processor: &P)
    where
        P: Processor<Breakpoint = B>,
    {
        for registered in self.by_guest_address.values() {
            processor.remove_breakpoint(&registered.handle);
        }
        self.by_guest_address.clear();
        self.host_index.clear();
    }

    pub fn contains(&self, addr: GuestAddress) -> bool {
        self.by_guest_address.contains_key(&addr)
    }

    pub fn len(&self) -> usize {
        self.by_guest_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_guest_address.is_empty()
    }
}
