//! Typed view of the request packets the stub understands.

use crate::address::GuestAddress;
use crate::protocol::Packet;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// A decoded debugger request.
///
/// Commands with arguments are fully parsed here; dispatch never touches raw
/// packet text. A recognized token with arguments that fail to parse folds
/// into [`Command::Malformed`], everything unrecognized into
/// [`Command::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `?`, the halt-reason query sent right after connecting.
    HaltReason,
    /// `!`, enables extended mode.
    ExtendedMode,
    /// `D`, debugger detach.
    Detach,
    /// `c` / `C`, continue guest execution.
    Resume,
    /// `s`, single guest instruction step.
    Step,
    /// The out-of-band `0x03` byte.
    Interrupt,
    /// `m addr,len`, guest memory read.
    ReadMemory { addr: GuestAddress, len: u32 },
    /// `p rid`, read one register of the focused thread.
    ReadRegister { rid: u32 },
    /// `P`, register write.
    WriteRegister,
    /// `g`, read the whole register file of the focused thread.
    ReadAllRegisters,
    /// `vAttach`.
    Attach,
    /// `qC`, current thread query.
    QueryCurrentThread,
    /// `H op tid`, thread focus change. `None` asks for "any thread".
    SetThread { id: Option<u32> },
    /// `Z type,addr,kind`, install a code breakpoint.
    InsertBreakpoint { addr: GuestAddress },
    /// `z type,addr,kind`, delete a code breakpoint.
    RemoveBreakpoint { addr: GuestAddress },
    /// `qXfer object:read:...`, document transfer.
    Xfer { object: String },
    /// `qSupported`.
    QuerySupported,
    /// `qfThreadInfo`.
    ThreadList,
    /// Recognized token with unparseable arguments.
    Malformed,
    Unknown(String),
}

impl Command {
    pub fn classify(packet: &Packet) -> Command {
        match packet.cmd.as_str() {
            "?" => Command::HaltReason,
            "!" => Command::ExtendedMode,
            "D" => Command::Detach,
            "c" | "C" => Command::Resume,
            "s" => Command::Step,
            "\x03" => Command::Interrupt,
            "m" => parse_read_memory(&packet.data),
            "p" => parse_read_register(&packet.data),
            "P" => Command::WriteRegister,
            "g" => Command::ReadAllRegisters,
            "vAttach" => Command::Attach,
            "qC" => Command::QueryCurrentThread,
            "H" => parse_set_thread(&packet.data),
            "Z" => parse_breakpoint(&packet.data)
                .map(|addr| Command::InsertBreakpoint { addr })
                .unwrap_or(Command::Malformed),
            "z" => parse_breakpoint(&packet.data)
                .map(|addr| Command::RemoveBreakpoint { addr })
                .unwrap_or(Command::Malformed),
            "qXfer" => parse_xfer(&packet.data),
            "qSupported" => Command::QuerySupported,
            "qfThreadInfo" => Command::ThreadList,
            other => Command::Unknown(other.to_string()),
        }
    }
}

fn parse_read_memory(data: &str) -> Command {
    let Some((addr, len)) = data.split_once(',') else {
        return Command::Malformed;
    };
    match (
        u32::from_str_radix(addr, 16),
        u32::from_str_radix(len, 16),
    ) {
        (Ok(addr), Ok(len)) => Command::ReadMemory {
            addr: addr.into(),
            len,
        },
        _ => Command::Malformed,
    }
}

fn parse_read_register(data: &str) -> Command {
    match u32::from_str_radix(data, 16) {
        Ok(rid) => Command::ReadRegister { rid },
        Err(_) => Command::Malformed,
    }
}

fn parse_set_thread(data: &str) -> Command {
    // An operation character (`g` or `c`), then a thread id. `-1` and `0`
    // both mean "pick for me".
    let Some(id) = data.get(1..) else {
        return Command::Malformed;
    };
    match i64::from_str_radix(id, 16) {
        Ok(id) if id > 0 => Command::SetThread {
            id: u32::try_from(id).ok(),
        },
        Ok(_) => Command::SetThread { id: None },
        Err(_) => Command::Malformed,
    }
}

fn parse_breakpoint(data: &str) -> Option<GuestAddress> {
    let mut parts = data.split(',');
    let _type = parts.next()?;
    let addr = parts.next()?;
    u32::from_str_radix(addr, 16).ok().map(GuestAddress::from)
}

fn parse_xfer(data: &str) -> Command {
    // The split already dropped one delimiter, but tolerate a doubled one.
    let data = data.strip_prefix(':').unwrap_or(data);
    let object = data.split(':').next().unwrap_or_default();
    Command::Xfer {
        object: object.to_string(),
    }
}

static COMMAND_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("?", "StartupQuery"),
        ("!", "EnableExtendedMode"),
        ("p", "ReadRegister"),
        ("P", "WriteRegister"),
        ("g", "ReadAllRegisters"),
        ("C", "Continue"),
        ("c", "continue"),
        ("s", "step"),
        ("vAttach", "vAttach"),
        ("m", "MemRead"),
        ("H", "SetThreadId"),
        ("Z", "CreateCodeBreakpoint"),
        ("z", "DeleteCodeBreakpoint"),
        ("qXfer", "Xfer"),
        ("qSupported", "Supported"),
        ("qfThreadInfo", "qfThreadInfo"),
        ("qC", "GetThreadId"),
        ("D", "Detach"),
        ("\x03", "Break"),
    ])
});

/// Human-readable command name for trace logs.
pub fn friendly_name(cmd: &str) -> &str {
    COMMAND_NAMES.get(cmd).copied().unwrap_or(cmd)
}

#[cfg(test)]
mod test {
    use super::*;

    fn classify(cmd: &str, data: &str) -> Command {
        Command::classify(&Packet {
            cmd: cmd.to_string(),
            data: data.to_string(),
            checksum: 0,
        })
    }

    #[test]
    fn test_memory_read_arguments() {
        assert_eq!(
            classify("m", "82000000,40"),
            Command::ReadMemory {
                addr: 0x8200_0000.into(),
                len: 0x40
            }
        );
        assert_eq!(classify("m", "82000000"), Command::Malformed);
        assert_eq!(classify("m", "zz,10"), Command::Malformed);
    }

    #[test]
    fn test_breakpoint_arguments() {
        assert_eq!(
            classify("Z", "0,82001234,4"),
            Command::InsertBreakpoint {
                addr: 0x8200_1234.into()
            }
        );
        assert_eq!(
            classify("z", "0,82001234,4"),
            Command::RemoveBreakpoint {
                addr: 0x8200_1234.into()
            }
        );
        assert_eq!(classify("Z", "0"), Command::Malformed);
    }

    #[test]
    fn test_thread_focus_arguments() {
        assert_eq!(classify("H", "g7"), Command::SetThread { id: Some(7) });
        assert_eq!(classify("H", "c-1"), Command::SetThread { id: None });
        assert_eq!(classify("H", "g0"), Command::SetThread { id: None });
        assert_eq!(classify("H", ""), Command::Malformed);
        assert_eq!(classify("H", "gxyz"), Command::Malformed);
    }

    #[test]
    fn test_xfer_object() {
        assert_eq!(
            classify("qXfer", "features:read:target.xml:0,1000"),
            Command::Xfer {
                object: "features".to_string()
            }
        );
        assert_eq!(
            classify("qXfer", ":threads:read::0,800"),
            Command::Xfer {
                object: "threads".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_token() {
        assert_eq!(
            classify("qOffsets", ""),
            Command::Unknown("qOffsets".to_string())
        );
    }
}
