use ppcstub::address::{GuestAddress, HostAddress};
use ppcstub::processor::{
    BreakpointHandle, CallFrame, ExecutionState, GuestModule, Heap, Kernel, Memory, PpcContext,
    Processor, Protection, ThreadSnapshot,
};
use ppcstub::Transport;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

/// Operations the stub performed against the emulator, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorOp {
    Pause,
    Resume,
    Step(u32),
    Install(GuestAddress),
    Uninstall(GuestAddress),
}

pub struct FakeBreakpoint {
    pub addr: GuestAddress,
    pub hosts: Vec<HostAddress>,
}

impl BreakpointHandle for FakeBreakpoint {
    fn guest_address(&self) -> GuestAddress {
        self.addr
    }

    fn host_addresses(&self) -> Vec<HostAddress> {
        self.hosts.clone()
    }
}

pub struct FakeHeap {
    pub base: u32,
    pub size: u32,
    pub readable: bool,
}

impl Heap for FakeHeap {
    fn protection(&self, _: GuestAddress) -> Option<Protection> {
        Some(Protection {
            read: self.readable,
            write: true,
        })
    }

    fn read(&self, addr: GuestAddress, buf: &mut [u8]) -> bool {
        let start = addr.as_u32();
        if start + buf.len() as u32 > self.base + self.size {
            return false;
        }
        // Memory contents are the low byte of each address.
        for (offset, byte) in buf.iter_mut().enumerate() {
            *byte = (start as usize + offset) as u8;
        }
        true
    }
}

pub struct FakeRam {
    pub heaps: Vec<FakeHeap>,
}

impl Memory for FakeRam {
    fn heap_containing(&self, addr: GuestAddress) -> Option<&dyn Heap> {
        self.heaps
            .iter()
            .find(|heap| addr.as_u32() >= heap.base && addr.as_u32() < heap.base + heap.size)
            .map(|heap| heap as &dyn Heap)
    }
}

pub struct FakeProcessor {
    pub state: Mutex<ExecutionState>,
    pub threads: Vec<ThreadSnapshot>,
    pub ops: Mutex<Vec<ProcessorOp>>,
    pub ram: FakeRam,
}

impl FakeProcessor {
    /// Two guest threads, one readable heap at 0x10000 and one read-protected
    /// heap at 0x20000.
    pub fn new() -> Self {
        let mut lead_context = PpcContext::default();
        lead_context.lr = 0x8000_0104;
        lead_context.r[1] = 0x7004_0000;

        FakeProcessor {
            state: Mutex::new(ExecutionState::Running),
            threads: vec![
                ThreadSnapshot {
                    id: 7,
                    name: "XThread0007".to_string(),
                    context: lead_context,
                    frames: vec![
                        CallFrame { guest_pc: None },
                        CallFrame {
                            guest_pc: Some(0x8200_0040.into()),
                        },
                    ],
                },
                ThreadSnapshot {
                    id: 9,
                    name: "XThread0009".to_string(),
                    context: PpcContext::default(),
                    frames: vec![CallFrame {
                        guest_pc: Some(0x8200_0100.into()),
                    }],
                },
            ],
            ops: Mutex::new(vec![]),
            ram: FakeRam {
                heaps: vec![
                    FakeHeap {
                        base: 0x10000,
                        size: 0x1000,
                        readable: true,
                    },
                    FakeHeap {
                        base: 0x20000,
                        size: 0x1000,
                        readable: false,
                    },
                ],
            },
        }
    }

    pub fn ops(&self) -> Vec<ProcessorOp> {
        self.ops.lock().unwrap().clone()
    }

    fn record(&self, op: ProcessorOp) {
        self.ops.lock().unwrap().push(op);
    }
}

impl Processor for FakeProcessor {
    type Breakpoint = FakeBreakpoint;

    fn execution_state(&self) -> ExecutionState {
        *self.state.lock().unwrap()
    }

    fn pause(&self) -> anyhow::Result<()> {
        *self.state.lock().unwrap() = ExecutionState::Paused;
        self.record(ProcessorOp::Pause);
        Ok(())
    }

    fn resume(&self) -> anyhow::Result<()> {
        *self.state.lock().unwrap() = ExecutionState::Running;
        self.record(ProcessorOp::Resume);
        Ok(())
    }

    fn step_guest_instruction(&self, thread_id: u32) -> anyhow::Result<()> {
        self.record(ProcessorOp::Step(thread_id));
        Ok(())
    }

    fn query_thread_debug_infos(&self) -> Vec<ThreadSnapshot> {
        self.threads.clone()
    }

    fn create_breakpoint(&self, addr: GuestAddress) -> FakeBreakpoint {
        let base = addr.as_u32() as usize;
        FakeBreakpoint {
            addr,
            hosts: vec![(base * 0x10).into(), (base * 0x10 + 4).into()],
        }
    }

    fn add_breakpoint(&self, bp: &FakeBreakpoint) {
        self.record(ProcessorOp::Install(bp.addr));
    }

    fn remove_breakpoint(&self, bp: &FakeBreakpoint) {
        self.record(ProcessorOp::Uninstall(bp.addr));
    }

    fn memory(&self) -> &dyn Memory {
        &self.ram
    }
}

pub struct FakeModule {
    name: String,
}

impl GuestModule for FakeModule {
    fn name(&self) -> &str {
        &self.name
    }
}

pub struct FakeKernel;

impl Kernel for FakeKernel {
    fn loaded_modules(&self) -> Vec<Arc<dyn GuestModule>> {
        vec![Arc::new(FakeModule {
            name: "default.xex".to_string(),
        })]
    }
}

/// What one `recv` call should produce.
pub enum Io {
    Chunk(Vec<u8>),
    Pending,
}

/// Transport fed from a fixed script; hangs up when the script runs dry.
pub struct ScriptTransport {
    script: VecDeque<Io>,
    pub sent: Vec<u8>,
}

impl ScriptTransport {
    pub fn new(script: Vec<Io>) -> Self {
        ScriptTransport {
            script: script.into(),
            sent: vec![],
        }
    }
}

impl Transport for ScriptTransport {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.script.pop_front() {
            Some(Io::Chunk(data)) => {
                buf[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            }
            Some(Io::Pending) => Err(io::ErrorKind::WouldBlock.into()),
            None => Ok(0),
        }
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.sent.extend_from_slice(data);
        Ok(())
    }
}

/// Split a sent byte stream back into acked reply bodies, verifying the
/// checksum of every frame on the way.
pub fn parse_replies(sent: &[u8]) -> (usize, Vec<String>) {
    let mut acks = 0;
    let mut bodies = vec![];
    let mut idx = 0;
    while idx < sent.len() {
        match sent[idx] {
            b'+' => {
                acks += 1;
                idx += 1;
            }
            b'$' => {
                let end = sent[idx..]
                    .iter()
                    .position(|&b| b == b'#')
                    .expect("unterminated frame")
                    + idx;
                let body = &sent[idx + 1..end];
                let digits = std::str::from_utf8(&sent[end + 1..end + 3]).unwrap();
                let transmitted = u8::from_str_radix(digits, 16).unwrap();
                let computed = body.iter().fold(0u8, |sum, &b| sum.wrapping_add(b));
                assert_eq!(transmitted, computed, "reply checksum mismatch");
                bodies.push(String::from_utf8(body.to_vec()).unwrap());
                idx = end + 3;
            }
            other => panic!("unexpected byte {other:#x} in sent stream"),
        }
    }
    (acks, bodies)
}
