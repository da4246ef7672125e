//! Remote serial protocol stub exposing a PowerPC guest to debugger clients.
//!
//! The stub speaks the wire protocol understood by gdb, IDA and friends:
//! inspect thread state, read guest memory, list modules and threads, place
//! code breakpoints and drive execution. It owns none of the machinery it
//! exposes; the host emulator plugs in through the traits in [`processor`]
//! and forwards its execution events to [`session::GdbStub`].
//!
//! ```no_run
//! # use ppcstub::processor::{Kernel, Processor};
//! # use std::net::TcpListener;
//! # use std::sync::Arc;
//! # fn demo<P, K>(processor: Arc<P>, kernel: Arc<K>) -> anyhow::Result<()>
//! # where P: Processor, K: Kernel {
//! let stub = Arc::new(ppcstub::GdbStub::new(processor, kernel));
//! let listener = TcpListener::bind("127.0.0.1:23946")?;
//! for client in listener.incoming() {
//!     stub.serve(ppcstub::TcpTransport::new(client?)?)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod breakpoint;
pub mod cache;
pub mod commands;
pub mod error;
pub mod processor;
pub mod protocol;
pub mod session;
pub mod target;

pub use address::{GuestAddress, HostAddress};
pub use error::Error;
pub use session::{GdbStub, TcpTransport, Transport};
