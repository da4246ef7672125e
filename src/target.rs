//! Target description served to the debugger and register encoding rules.
//!
//! Registers follow the numbering of the rs6000 descriptions shipped with
//! gdb: r0..r31 are 0..31, f0..f31 are 32..63, then pc, msr, cr, lr, ctr,
//! xer and fpscr as 64..70.

use crate::address::GuestAddress;
use crate::processor::ThreadSnapshot;

pub const PC_REGISTER: u32 = 64;
pub const LR_REGISTER: u32 = 67;

/// Total number of registers exposed through the description.
pub const REGISTER_COUNT: u32 = 71;

// GPRs are described as 32-bit even though the underlying machine is 64-bit:
// some clients switch to a 64-bit disassembler the moment they see 64-bit
// GPRs and then refuse to decode the guest code.
//
// The leading `l` marks the document as the last `qXfer` chunk; clients
// reject the description without it.
pub const TARGET_XML: &str = r#"l<?xml version="1.0"?>
<!DOCTYPE target SYSTEM "gdb-target.dtd">
<target version="1.0">
<feature name="org.gnu.gdb.power.core">
  <reg name="r0" bitsize="32" type="uint32"/>
  <reg name="r1" bitsize="32" type="uint32"/>
  <reg name="r2" bitsize="32" type="uint32"/>
  <reg name="r3" bitsize="32" type="uint32"/>
  <reg name="r4" bitsize="32" type="uint32"/>
  <reg name="r5" bitsize="32" type="uint32"/>
  <reg name="r6" bitsize="32" type="uint32"/>
  <reg name="r7" bitsize="32" type="uint32"/>
  <reg name="r8" bitsize="32" type="uint32"/>
  <reg name="r9" bitsize="32" type="uint32"/>
  <reg name="r10" bitsize="32" type="uint32"/>
  <reg name="r11" bitsize="32" type="uint32"/>
  <reg name="r12" bitsize="32" type="uint32"/>
  <reg name="r13" bitsize="32" type="uint32"/>
  <reg name="r14" bitsize="32" type="uint32"/>
  <reg name="r15" bitsize="32" type="uint32"/>
  <reg name="r16" bitsize="32" type="uint32"/>
  <reg name="r17" bitsize="32" type="uint32"/>
  <reg name="r18" bitsize="32" type="uint32"/>
  <reg name="r19" bitsize="32" type="uint32"/>
  <reg name="r20" bitsize="32" type="uint32"/>
  <reg name="r21" bitsize="32" type="uint32"/>
  <reg name="r22" bitsize="32" type="uint32"/>
  <reg name="r23" bitsize="32" type="uint32"/>
  <reg name="r24" bitsize="32" type="uint32"/>
  <reg name="r25" bitsize="32" type="uint32"/>
  <reg name="r26" bitsize="32" type="uint32"/>
  <reg name="r27" bitsize="32" type="uint32"/>
  <reg name="r28" bitsize="32" type="uint32"/>
  <reg name="r29" bitsize="32" type="uint32"/>
  <reg name="r30" bitsize="32" type="uint32"/>
  <reg name="r31" bitsize="32" type="uint32"/>

  <reg name="pc" bitsize="32" type="code_ptr" regnum="64"/>
  <reg name="msr" bitsize="32" type="uint32"/>
  <reg name="cr" bitsize="32" type="uint32"/>
  <reg name="lr" bitsize="32" type="code_ptr"/>
  <reg name="ctr" bitsize="32" type="uint32"/>
  <reg name="xer" bitsize="32" type="uint32"/>
</feature>
<feature name="org.gnu.gdb.power.fpu">
  <reg name="f0" bitsize="64" type="ieee_double" regnum="32"/>
  <reg name="f1" bitsize="64" type="ieee_double"/>
  <reg name="f2" bitsize="64" type="ieee_double"/>
  <reg name="f3" bitsize="64" type="ieee_double"/>
  <reg name="f4" bitsize="64" type="ieee_double"/>
  <reg name="f5" bitsize="64" type="ieee_double"/>
  <reg name="f6" bitsize="64" type="ieee_double"/>
  <reg name="f7" bitsize="64" type="ieee_double"/>
  <reg name="f8" bitsize="64" type="ieee_double"/>
  <reg name="f9" bitsize="64" type="ieee_double"/>
  <reg name="f10" bitsize="64" type="ieee_double"/>
  <reg name="f11" bitsize="64" type="ieee_double"/>
  <reg name="f12" bitsize="64" type="ieee_double"/>
  <reg name="f13" bitsize="64" type="ieee_double"/>
  <reg name="f14" bitsize="64" type="ieee_double"/>
  <reg name="f15" bitsize="64" type="ieee_double"/>
  <reg name="f16" bitsize="64" type="ieee_double"/>
  <reg name="f17" bitsize="64" type="ieee_double"/>
  <reg name="f18" bitsize="64" type="ieee_double"/>
  <reg name="f19" bitsize="64" type="ieee_double"/>
  <reg name="f20" bitsize="64" type="ieee_double"/>
  <reg name="f21" bitsize="64" type="ieee_double"/>
  <reg name="f22" bitsize="64" type="ieee_double"/>
  <reg name="f23" bitsize="64" type="ieee_double"/>
  <reg name="f24" bitsize="64" type="ieee_double"/>
  <reg name="f25" bitsize="64" type="ieee_double"/>
  <reg name="f26" bitsize="64" type="ieee_double"/>
  <reg name="f27" bitsize="64" type="ieee_double"/>
  <reg name="f28" bitsize="64" type="ieee_double"/>
  <reg name="f29" bitsize="64" type="ieee_double"/>
  <reg name="f30" bitsize="64" type="ieee_double"/>
  <reg name="f31" bitsize="64" type="ieee_double"/>

  <reg name="fpscr" bitsize="32" group="float" regnum="70"/>
</feature>
</target>
"#;

/// Encode one register as fixed-width lowercase hex.
///
/// 32-bit registers take 8 digits, floats 16. Registers the guest context
/// does not track (msr, xer, fpscr) encode as `x` runs meaning "unavailable".
/// An id past the register file yields an empty string.
///
/// A PC read consumes the armed breakpoint address when present: after a stop
/// the reported PC does not always match the breakpoint site, and clients
/// fail to pair the stop with their breakpoint list unless the first read
/// returns the site itself.
pub fn encode_register(
    thread: &ThreadSnapshot,
    notify_pc: &mut Option<GuestAddress>,
    rid: u32,
) -> String {
    match rid {
        64 => {
            if let Some(addr) = notify_pc.take() {
                return format!("{:08x}", addr.as_u32());
            }
            // Clients only care about guest code, skip host-only frames.
            let pc = thread
                .frames
                .iter()
                .find_map(|frame| frame.guest_pc)
                .unwrap_or_default();
            format!("{:08x}", pc.as_u32())
        }
        65 | 69 | 70 => "x".repeat(8),
        66 => format!("{:08x}", thread.context.cr),
        67 => format!("{:08x}", thread.context.lr as u32),
        68 => format!("{:08x}", thread.context.ctr as u32),
        rid if rid > 70 => String::new(),
        rid if rid > 31 => format!("{:016x}", thread.context.f[(rid - 32) as usize].to_bits()),
        rid => format!("{:08x}", thread.context.r[rid as usize] as u32),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::processor::{CallFrame, PpcContext};

    fn snapshot() -> ThreadSnapshot {
        let mut context = PpcContext {
            lr: 0x8220_0000_8000_0104,
            ctr: 0x20,
            cr: 0x8000_0000,
            ..PpcContext::default()
        };
        context.r[3] = 0xffff_ffff_8000_abcd;
        context.f[1] = 0.5;
        ThreadSnapshot {
            id: 7,
            name: "XThread0007".to_string(),
            context,
            frames: vec![
                CallFrame { guest_pc: None },
                CallFrame {
                    guest_pc: Some(0x8200_0040.into()),
                },
            ],
        }
    }

    #[test]
    fn test_widths_and_truncation() {
        let thread = snapshot();
        let mut none = None;
        assert_eq!(encode_register(&thread, &mut none, 3), "8000abcd");
        assert_eq!(encode_register(&thread, &mut none, 33), "3fe0000000000000");
        assert_eq!(encode_register(&thread, &mut none, 65), "xxxxxxxx");
        assert_eq!(encode_register(&thread, &mut none, 66), "80000000");
        assert_eq!(encode_register(&thread, &mut none, 67), "80000104");
        assert_eq!(encode_register(&thread, &mut none, 68), "00000020");
        assert_eq!(encode_register(&thread, &mut none, 71), "");
    }

    #[test]
    fn test_pc_falls_back_to_first_guest_frame() {
        let thread = snapshot();
        let mut none = None;
        assert_eq!(encode_register(&thread, &mut none, 64), "82000040");
    }

    #[test]
    fn test_pc_read_consumes_armed_address() {
        let thread = snapshot();
        let mut armed = Some(0x8200_1000.into());
        assert_eq!(encode_register(&thread, &mut armed, 64), "82001000");
        assert!(armed.is_none());
        assert_eq!(encode_register(&thread, &mut armed, 64), "82000040");
    }

    // The concatenation of every register is 32*8 + 32*16 + 7*8 hex chars.
    #[test]
    fn test_register_file_width() {
        let thread = snapshot();
        let mut none = None;
        let all: String = (0..REGISTER_COUNT)
            .map(|rid| encode_register(&thread, &mut none, rid))
            .collect();
        assert_eq!(all.len(), 824);
        assert!(all.chars().all(|c| c.is_ascii_hexdigit() || c == 'x'));
    }

    #[test]
    fn test_description_served_as_last_chunk() {
        assert!(TARGET_XML.starts_with("l<?xml"));
        assert!(TARGET_XML.contains("org.gnu.gdb.power.core"));
        assert!(TARGET_XML.contains("org.gnu.gdb.power.fpu"));
        assert!(TARGET_XML.trim_end().ends_with("</target>"));
    }
}
