//! Pushing a firmware image through Write Memory, packet by packet.

use log::{debug, info};

use crate::error::Result;
use crate::protocol::{self, CommandSet};
use crate::uart::UartPort;

/// Every packet put on the wire is exactly this long; short tails are filled
/// with 0xFF, the erased-flash value.
pub const PACKET_SIZE: usize = 256;

/// One progress report per packet written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Target address of the packet just written.
    pub address: u32,
    /// Offset of that packet within the image.
    pub offset: usize,
    /// Total padded length of the image.
    pub total: usize,
}

/// Image length rounded up for the target's word-oriented flash writes.
///
/// This is the historical formula: an already word-aligned image still gains
/// four filler bytes, and downstream tooling depends on the resulting byte
/// stream, so it stays.
pub(crate) fn padded_length(len: usize) -> usize {
    len + (4 - len % 4)
}

/// Erase has already run; write `data` to consecutive packets starting at
/// `start_address`, reporting after each packet.
pub(crate) fn write_all(
    port: &mut dyn UartPort,
    commands: &CommandSet,
    start_address: u32,
    data: &[u8],
    progress: &mut dyn FnMut(Progress),
) -> Result<()> {
    let total = padded_length(data.len());
    info!(
        "writing {} bytes ({} padded) at {:#010x}",
        data.len(),
        total,
        start_address
    );

    let mut address = start_address;
    let mut offset = 0usize;
    while offset < total {
        let mut packet = [0xFFu8; PACKET_SIZE];
        if offset < data.len() {
            let len = PACKET_SIZE.min(data.len() - offset);
            packet[..len].copy_from_slice(&data[offset..offset + len]);
        }
        protocol::write_memory(port, commands, address, &packet)?;
        debug!("wrote packet at {:#010x}", address);
        progress(Progress {
            address,
            offset,
            total,
        });
        address += PACKET_SIZE as u32;
        offset += PACKET_SIZE;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::padded_length;

    #[test]
    fn pads_up_to_the_next_word() {
        assert_eq!(padded_length(1), 4);
        assert_eq!(padded_length(3), 4);
        assert_eq!(padded_length(255), 256);
        assert_eq!(padded_length(1001), 1004);
    }

    #[test]
    fn aligned_lengths_still_gain_a_word() {
        assert_eq!(padded_length(0), 4);
        assert_eq!(padded_length(4), 8);
        assert_eq!(padded_length(256), 260);
        assert_eq!(padded_length(1000), 1004);
    }
}
