//! Debugger session bound to one connected client.
//!
//! The embedder owns the TCP listener; every accepted connection is handed to
//! [`GdbStub::serve`], which drives the receive buffer, dispatches commands
//! and delivers asynchronous stop notifications until the peer goes away.

use crate::address::GuestAddress;
use crate::cache::SessionCache;
use crate::commands::{self, Command};
use crate::error::Error;
use crate::processor::{BreakpointHandle, ExecutionState, Kernel, Processor, ThreadSnapshot};
use crate::protocol::{self, Packet, Receiver};
use crate::target::{self, LR_REGISTER, PC_REGISTER, REGISTER_COUNT, TARGET_XML};
use crate::{muted_error, weak_error};
use itertools::Itertools;
use log::{debug, info, warn};
use std::fmt::Write as _;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const REPLY_OK: &str = "OK";
const REPLY_ERROR: &str = "E01";
/// Constant halt reason: stopped by SIGTRAP.
const REPLY_STOPPED: &str = "S05";
const REPLY_SUPPORTED: &str = "PacketSize=1024;qXfer:features:read+;qXfer:threads:read+";

const SIGTRAP: u8 = 5;

/// How long the loop sleeps when the socket has nothing for us.
const RECV_POLL: Duration = Duration::from_millis(10);

/// Byte transport to the debugger client.
///
/// `recv` must not block: return `WouldBlock` when no data is pending and
/// `Ok(0)` only when the peer closed the connection.
pub trait Transport {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn send(&mut self, data: &[u8]) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).recv(buf)
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).send(data)
    }
}

/// [`Transport`] over an accepted TCP connection.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        Ok(TcpTransport { stream })
    }
}

impl Transport for TcpTransport {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)
    }
}

/// Remote debugger stub for one guest.
///
/// Exposes guest threads, memory, modules and code breakpoints to a remote
/// serial protocol client. The embedder keeps one instance in an [`Arc`],
/// serves connections from a listener thread and forwards processor events
/// from wherever the emulator raises them.
pub struct GdbStub<P: Processor, K: Kernel> {
    processor: Arc<P>,
    kernel: Arc<K>,
    state: Arc<Mutex<SessionCache<P::Breakpoint>>>,
    stop: AtomicBool,
}

impl<P: Processor, K: Kernel> GdbStub<P, K> {
    pub fn new(processor: Arc<P>, kernel: Arc<K>) -> Self {
        let stub = GdbStub {
            processor,
            kernel,
            state: Arc::new(Mutex::new(SessionCache::default())),
            stop: AtomicBool::new(false),
        };
        stub.with_state(|state, processor, kernel| state.refresh(processor, kernel));
        stub
    }

    /// Ask a running [`GdbStub::serve`] call to wind down at its next tick.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    fn with_state<R>(
        &self,
        f: impl FnOnce(&mut SessionCache<P::Breakpoint>, &P, &K) -> R,
    ) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state, self.processor.as_ref(), self.kernel.as_ref())
    }

    // ---------------------------------------------------------------------
    // processor events
    // ---------------------------------------------------------------------

    pub fn on_execution_paused(&self) {
        debug!("execution paused");
        self.with_state(|state, processor, kernel| state.refresh(processor, kernel));
    }

    pub fn on_execution_continued(&self) {
        debug!("execution continued");
        self.with_state(|state, processor, kernel| state.refresh(processor, kernel));
    }

    pub fn on_execution_ended(&self) {
        debug!("execution ended");
        self.with_state(|state, processor, kernel| state.refresh(processor, kernel));
    }

    /// A single-step requested through `s` has landed.
    ///
    /// Some clients remove the current breakpoint, step past it and re-add it
    /// only after the step is reported, so the step target is remembered just
    /// like a breakpoint hit.
    pub fn on_step_completed(&self, thread_id: u32) {
        debug!("step completed on thread {thread_id}");
        self.with_state(|state, processor, kernel| {
            state.notify_bp_thread_id = Some(thread_id);
            state.last_bp_thread_id = Some(thread_id);
            state.refresh(processor, kernel);
        });
    }

    pub fn on_breakpoint_hit(&self, bp: &P::Breakpoint, thread_id: u32) {
        let addr = bp.guest_address();
        debug!("breakpoint hit at {addr} (thread {thread_id})");
        self.with_state(|state, processor, kernel| {
            state.notify_bp_guest_address = Some(addr);
            state.notify_bp_thread_id = Some(thread_id);
            state.last_bp_thread_id = Some(thread_id);
            state.refresh(processor, kernel);
        });
    }

    /// The embedder dropped the debugging session from its side.
    pub fn on_detached(&self) {
        self.with_state(|state, processor, kernel| {
            state.refresh(processor, kernel);
            state.breakpoints.remove_all(processor);
        });
    }

    // ---------------------------------------------------------------------
    // session loop
    // ---------------------------------------------------------------------

    /// Serve one connected client until disconnect or [`GdbStub::shutdown`].
    ///
    /// Connecting pauses the guest. Leaving, however it happens, removes
    /// every breakpoint this session installed and resumes the guest so a
    /// detached emulator keeps running.
    pub fn serve<T: Transport>(&self, mut transport: T) -> Result<(), Error> {
        info!("debugger client connected, pausing guest execution");
        weak_error!(self.processor.pause(), "pause on connect:");
        self.with_state(|state, processor, kernel| state.refresh(processor, kernel));

        let served = self.session_loop(&mut transport);

        self.with_state(|state, processor, _| {
            state.breakpoints.remove_all(processor);
        });
        if self.processor.execution_state() == ExecutionState::Paused {
            weak_error!(self.processor.resume(), "resume on disconnect:");
        }
        info!("debugger client disconnected");
        served
    }

    fn session_loop<T: Transport>(&self, transport: &mut T) -> Result<(), Error> {
        let mut receiver = Receiver::default();
        let mut buf = [0u8; 1024];

        while !self.stop.load(Ordering::Relaxed) {
            match transport.recv(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(received) => {
                    receiver.push(&buf[..received]);
                    while let Some(parsed) = receiver.next_packet() {
                        match parsed {
                            Ok(packet) => {
                                transport.send(&[protocol::ACK])?;
                                let reply = self.handle_packet(&packet);
                                transport.send(protocol::encode_packet(&reply).as_bytes())?;
                            }
                            Err(e) => {
                                warn!("rejecting frame: {e:#}");
                                transport.send(&[protocol::NACK])?;
                            }
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(RECV_POLL);
                }
                Err(e) => return Err(e.into()),
            }

            self.flush_stop_notification(transport)?;
        }
        Ok(())
    }

    /// Emit the pending stop reply, if one is armed, and disarm it.
    fn flush_stop_notification<T: Transport>(&self, transport: &mut T) -> Result<(), Error> {
        let reply = self.with_state(|state, _, _| {
            if !state.notify_stopped {
                return None;
            }
            if let Some(id) = state.notify_bp_thread_id {
                state.cur_thread_id = Some(id);
            }
            let reply = thread_state_reply(state, state.notify_bp_thread_id, SIGTRAP);
            state.notify_stopped = false;
            state.notify_bp_thread_id = None;
            Some(reply)
        });

        match reply {
            Some(reply) => Ok(transport.send(protocol::encode_packet(&reply).as_bytes())?),
            None => Ok(()),
        }
    }

    // ---------------------------------------------------------------------
    // command dispatch
    // ---------------------------------------------------------------------

    fn handle_packet(&self, packet: &Packet) -> String {
        debug!(
            "packet {}({})",
            commands::friendly_name(&packet.cmd),
            packet.data
        );
        self.handle_command(Command::classify(packet))
    }

    fn handle_command(&self, command: Command) -> String {
        match command {
            Command::HaltReason | Command::Attach => REPLY_STOPPED.to_string(),
            Command::ExtendedMode => REPLY_OK.to_string(),
            Command::Detach => self.detach(),
            Command::Resume => {
                weak_error!(self.processor.resume(), "continue:");
                REPLY_OK.to_string()
            }
            Command::Step => self.step(),
            Command::Interrupt => {
                weak_error!(self.processor.pause(), "interrupt:");
                REPLY_OK.to_string()
            }
            Command::ReadMemory { addr, len } => muted_error!(self.read_memory(addr, len))
                .unwrap_or_else(|| REPLY_ERROR.to_string()),
            Command::ReadRegister { rid } => muted_error!(self.read_register(rid))
                .unwrap_or_else(|| REPLY_ERROR.to_string()),
            // Register writes are acknowledged but never applied. A rejection
            // would abort the client's connection setup.
            Command::WriteRegister => REPLY_OK.to_string(),
            Command::ReadAllRegisters => muted_error!(self.read_all_registers())
                .unwrap_or_else(|| REPLY_ERROR.to_string()),
            Command::QueryCurrentThread => self.with_state(|state, _, _| {
                format!("QC{}", state.cur_thread_id.unwrap_or_default())
            }),
            Command::SetThread { id } => self.set_thread(id),
            Command::InsertBreakpoint { addr } => self.with_state(|state, processor, _| {
                if state.breakpoints.insert(processor, addr) {
                    REPLY_OK.to_string()
                } else {
                    REPLY_ERROR.to_string()
                }
            }),
            Command::RemoveBreakpoint { addr } => self.with_state(|state, processor, _| {
                state.breakpoints.remove(processor, addr);
                REPLY_OK.to_string()
            }),
            Command::Xfer { object } => match object.as_str() {
                "features" => TARGET_XML.to_string(),
                "threads" => self.with_state(|state, _, _| thread_list_xml(&state.threads)),
                _ => REPLY_ERROR.to_string(),
            },
            Command::QuerySupported => REPLY_SUPPORTED.to_string(),
            Command::ThreadList => self.with_state(|state, _, _| {
                format!("m{}", state.threads.iter().map(|thread| thread.id).join(","))
            }),
            Command::Malformed => REPLY_ERROR.to_string(),
            Command::Unknown(cmd) => {
                debug!("unsupported command {cmd:?}");
                String::new()
            }
        }
    }

    fn detach(&self) -> String {
        info!("debugger detached");
        self.with_state(|state, processor, _| {
            state.breakpoints.remove_all(processor);
        });
        if self.processor.execution_state() == ExecutionState::Paused {
            weak_error!(self.processor.resume(), "resume on detach:");
        }
        REPLY_OK.to_string()
    }

    fn step(&self) -> String {
        let target = self.with_state(|state, _, _| state.last_bp_thread_id);
        if let Some(thread_id) = target {
            weak_error!(
                self.processor.step_guest_instruction(thread_id),
                "step:"
            );
        }
        REPLY_OK.to_string()
    }

    fn read_memory(&self, addr: GuestAddress, len: u32) -> Result<String, Error> {
        let memory = self.processor.memory();
        let heap = memory
            .heap_containing(addr)
            .ok_or(Error::UnknownHeap(addr))?;
        let protect = heap.protection(addr).ok_or(Error::UnknownHeap(addr))?;
        if !protect.read {
            return Err(Error::MemoryProtected(addr));
        }

        let mut bytes = vec![0u8; len as usize];
        if !heap.read(addr, &mut bytes) {
            return Err(Error::TruncatedRead(addr, len as usize));
        }

        let mut reply = String::with_capacity(bytes.len() * 2);
        for byte in &bytes {
            let _ = write!(reply, "{byte:02x}");
        }
        Ok(reply)
    }

    fn read_register(&self, rid: u32) -> Result<String, Error> {
        self.with_state(|state, _, _| {
            let thread = match state.cur_thread_id {
                Some(id) => state.threads.iter().find(|thread| thread.id == id),
                None => None,
            }
            .ok_or(Error::NoThreadFocus)?;
            let encoded =
                target::encode_register(thread, &mut state.notify_bp_guest_address, rid);
            if encoded.is_empty() {
                return Err(Error::RegisterNotFound(rid));
            }
            Ok(encoded)
        })
    }

    fn read_all_registers(&self) -> Result<String, Error> {
        self.with_state(|state, _, _| {
            let thread = match state.cur_thread_id {
                Some(id) => state.threads.iter().find(|thread| thread.id == id),
                None => None,
            }
            .ok_or(Error::NoThreadFocus)?;
            let mut reply = String::with_capacity(824);
            for rid in 0..REGISTER_COUNT {
                reply.push_str(&target::encode_register(
                    thread,
                    &mut state.notify_bp_guest_address,
                    rid,
                ));
            }
            Ok(reply)
        })
    }

    fn set_thread(&self, id: Option<u32>) -> String {
        self.with_state(|state, _, _| {
            let requested = id.filter(|&id| state.thread(id).is_some());
            state.cur_thread_id = requested.or_else(|| state.threads.first().map(|t| t.id));
            REPLY_OK.to_string()
        })
    }
}

/// Build the `T05...` stop reply for `thread_id`, reporting PC and LR so the
/// client can place the stop without an extra register read. Falls back to a
/// bare `S05` when the thread is unknown.
fn thread_state_reply<B>(
    cache: &SessionCache<B>,
    thread_id: Option<u32>,
    signal: u8,
) -> String {
    let known = thread_id.and_then(|id| cache.thread(id).map(|thread| (id, thread)));
    let Some((id, thread)) = known else {
        return format!("S{signal:02x}");
    };

    let mut pc = thread
        .frames
        .iter()
        .find_map(|frame| frame.guest_pc)
        .unwrap_or_default();
    // Report the breakpoint site so the client pairs the stop with its own
    // breakpoint list. Left armed here: the first PC read consumes it.
    if let Some(addr) = cache.notify_bp_guest_address {
        pc = addr;
    }

    format!(
        "T{signal:02x}{PC_REGISTER:02x}:{:08x};{LR_REGISTER:02x}:{:08x};thread:{id:x};",
        pc.as_u32(),
        thread.context.lr as u32,
    )
}

fn thread_list_xml(threads: &[ThreadSnapshot]) -> String {
    let list = threads
        .iter()
        .map(|thread| {
            format!(
                r#"<thread id="{:x}" name="{}"></thread>"#,
                thread.id, thread.name
            )
        })
        .join("");
    format!(r#"l<?xml version="1.0"?><threads>{list}</threads>"#)
}
