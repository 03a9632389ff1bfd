//! The serial NOR command set.
//!
//! Every command starts with a single opcode byte.  Those that carry an
//! address follow it with three address bytes, most significant first, and
//! anything sent back by the device comes after that four byte header.

/// Opcodes understood by the device.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum Command {
    PageProgram = 0x02,
    Read = 0x03,
    ReadStatus = 0x05,
    WriteEnable = 0x06,
    SectorErase = 0xd8,
    ReadId = 0x9f,
}

impl Command {
    pub fn from_u8(op: u8) -> Option<Command> {
        match op {
            0x02 => Some(Command::PageProgram),
            0x03 => Some(Command::Read),
            0x05 => Some(Command::ReadStatus),
            0x06 => Some(Command::WriteEnable),
            0xd8 => Some(Command::SectorErase),
            0x9f => Some(Command::ReadId),
            _ => None,
        }
    }
}

/// Opcode plus a 24-bit address.
pub const HEADER: usize = 4;

/// Frame lengths of the fixed-size commands.
pub const STATUS_FRAME: usize = 2;
pub const ID_FRAME: usize = 4;
pub const ERASE_FRAME: usize = 4;

/// Status register bits.
pub const STATUS_BUSY: u8 = 0x01;
pub const STATUS_WEL: u8 = 0x02;

/// Encode the command header for `addr`.  Only the low 24 bits of the address
/// reach the device.
pub fn header(cmd: Command, addr: usize) -> [u8; HEADER] {
    [cmd as u8, (addr >> 16) as u8, (addr >> 8) as u8, addr as u8]
}

/// Decode the address of a command header.
pub fn address(frame: &[u8]) -> usize {
    (frame[1] as usize) << 16 | (frame[2] as usize) << 8 | frame[3] as usize
}
