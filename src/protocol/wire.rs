//! AN3155 wire vocabulary: opcodes, acknowledge bytes, checksums and frame
//! layout.

/// Positive acknowledge.
pub(crate) const ACK: u8 = 0x79;
/// Negative acknowledge. Not matched anywhere: at a decision point anything
/// other than ACK is a protocol error.
#[allow(dead_code)]
pub(crate) const NACK: u8 = 0x1F;
/// First byte on the line; the bootloader measures the baud rate from it.
pub(crate) const AUTOBAUD: u8 = 0x7F;

/// Erase selector for "all pages".
pub(crate) const MASS_ERASE_SELECTOR: [u8; 2] = [0xFF, 0x00];

/// Largest payload a single Write Memory accepts.
pub const MAX_WRITE_CHUNK: usize = 256;

/// The USART bootloader command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Fetch bootloader version and allowed commands
    Get = 0x00,

    /// Gets the bootloader version and the Read Protection status of the
    /// Flash memory.
    GetVersionReadStatus = 0x01,

    /// Gets the chip ID
    GetId = 0x02,

    /// Reads up to 256 bytes of memory starting from an address specified by
    /// the application.
    ReadMemory = 0x11,

    /// Jumps to user application code located in the internal Flash memory
    /// or in the SRAM.
    Go = 0x21,

    /// Writes up to 256 bytes to the RAM or Flash memory starting from an
    /// address specified by the application.
    WriteMemory = 0x31,

    /// Erases from one to all the Flash memory pages.
    Erase = 0x43,

    /// Erases from one to all the Flash memory pages using two byte
    /// addressing mode (v3.0 USART bootloader versions and above).
    ExtendedErase = 0x44,

    /// Enables the write protection for some sectors.
    WriteProtect = 0x63,

    /// Disables the write protection for all Flash memory sectors
    WriteUnprotect = 0x73,

    /// Enables the read protection
    ReadoutProtect = 0x82,

    /// Disables the read protection.
    ReadoutUnprotect = 0x92,
}

/// XOR of all bytes in `bytes`.
pub(crate) fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Command frame: the opcode followed by its complement.
pub(crate) fn command_frame(command: Command) -> [u8; 2] {
    let op = command as u8;
    [op, !op]
}

/// Address frame: four big-endian bytes plus their XOR checksum.
pub(crate) fn address_frame(address: u32) -> [u8; 5] {
    let bytes = address.to_be_bytes();
    let mut frame = [0u8; 5];
    frame[..4].copy_from_slice(&bytes);
    frame[4] = xor_checksum(&bytes);
    frame
}

/// Data frame: `length - 1`, the payload, and the XOR checksum over both.
pub(crate) fn data_frame(data: &[u8]) -> Vec<u8> {
    debug_assert!(!data.is_empty() && data.len() <= MAX_WRITE_CHUNK);
    let mut frame = Vec::with_capacity(data.len() + 2);
    frame.push((data.len() - 1) as u8);
    frame.extend_from_slice(data);
    frame.push(xor_checksum(&frame));
    frame
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_frame_is_opcode_and_complement() {
        assert_eq!(command_frame(Command::Get), [0x00, 0xFF]);
        assert_eq!(command_frame(Command::GetId), [0x02, 0xFD]);
        assert_eq!(command_frame(Command::WriteMemory), [0x31, 0xCE]);
        assert_eq!(command_frame(Command::Erase), [0x43, 0xBC]);
    }

    #[test]
    fn address_frame_checksum() {
        assert_eq!(
            address_frame(0x0800_0000),
            [0x08, 0x00, 0x00, 0x00, 0x08]
        );
        assert_eq!(
            address_frame(0x0800_0100),
            [0x08, 0x00, 0x01, 0x00, 0x09]
        );
    }

    #[test]
    fn data_frame_layout() {
        let frame = data_frame(&[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(frame[0], 0x03);
        assert_eq!(&frame[1..5], &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(frame[5], 0x03 ^ 0xAA ^ 0xBB ^ 0xCC ^ 0xDD);
    }

    #[test]
    fn data_frame_full_packet() {
        let data = [0xFF; 256];
        let frame = data_frame(&data);
        assert_eq!(frame.len(), 258);
        assert_eq!(frame[0], 0xFF);
        // 256 bytes of 0xFF cancel out pairwise.
        assert_eq!(frame[257], 0xFF);
    }
}
