use std::fmt::{Display, Formatter};

/// Address in the emulated PowerPC address space.
///
/// The guest always runs with a 32-bit virtual address space, whatever the
/// width of the machine hosting it.
#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug, Default, PartialOrd, Ord)]
pub struct GuestAddress(u32);

impl GuestAddress {
    #[inline(always)]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for GuestAddress {
    fn from(addr: u32) -> Self {
        GuestAddress(addr)
    }
}

impl From<GuestAddress> for u32 {
    fn from(addr: GuestAddress) -> Self {
        addr.0
    }
}

impl Display for GuestAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:#010X}", self.0))
    }
}

/// Native address of a patch site in translated code.
///
/// One guest instruction may be compiled into several native regions, so a
/// single guest breakpoint can own multiple host addresses.
#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug, Default, PartialOrd, Ord)]
pub struct HostAddress(usize);

impl HostAddress {
    #[inline(always)]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl From<usize> for HostAddress {
    fn from(addr: usize) -> Self {
        HostAddress(addr)
    }
}

impl From<HostAddress> for usize {
    fn from(addr: HostAddress) -> Self {
        addr.0
    }
}

impl Display for HostAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:#018X}", self.0))
    }
}
