use crate::address::GuestAddress;
use std::str::Utf8Error;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] Utf8Error),

    // --------------------------------- framing errors --------------------------------------------
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),
    #[error("checksum mismatch (computed {computed:#04x}, transmitted {transmitted:#04x})")]
    ChecksumMismatch { computed: u8, transmitted: u8 },

    // --------------------------------- guest memory errors ---------------------------------------
    #[error("no heap at address {0}")]
    UnknownHeap(GuestAddress),
    #[error("memory at {0} is not readable")]
    MemoryProtected(GuestAddress),
    #[error("read of {1} bytes at {0} leaves the heap")]
    TruncatedRead(GuestAddress, usize),

    // --------------------------------- thread state errors ---------------------------------------
    #[error("unknown register {0}")]
    RegisterNotFound(u32),
    #[error("no thread in focus")]
    NoThreadFocus,
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "gdbstub", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "gdbstub", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
