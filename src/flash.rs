use usb_device::control::Request;

use crate::msos::VendorReply;
use crate::zone::Zone;

/// Busy bit of the flash status register.
pub const STATUS_BUSY: u8 = 0x01;

/// Trait that describes the flash chip and the board around
/// [`Dfu`](crate::dfu::Dfu). The constants configure the protocol and the
/// programming pipeline, the functions issue flash commands.
///
/// All commands are fire and forget: they must return as soon as the
/// command is sent, completion is observed later through
/// [`read_status`](DfuFlash::read_status). The pipeline never sends a
/// command while the busy bit is set.
pub trait DfuFlash {
    /// Flash zones, indexed by alternate setting.
    ///
    /// Every zone becomes one alternate setting of the DFU interface, named
    /// after [`Zone::name`].
    const ZONES: &'static [Zone];

    /// Size of the block cleared by [`erase_block`](DfuFlash::erase_block).
    /// Default is 64 KiB.
    const ERASE_BLOCK_SIZE: u32 = 64 * 1024;

    /// Program page size, a single program never crosses a page boundary.
    /// Default is `256` bytes.
    const PAGE_SIZE: u32 = 256;

    /// `bwPollTimeout` in every `DFU_GETSTATUS` reply. Default is `5` ms.
    const POLL_TIMEOUT_MS: u32 = 5;

    /// wDetachTimeOut field in DFU functional descriptor. Default value: `1000` ms.
    const DETACH_TIMEOUT: u16 = 1000;

    /// Upper bound on pipeline ticks spent inside one `DFU_GETSTATUS`
    /// while draining the buffers after the final block.
    const MANIFEST_DRAIN_LIMIT: u32 = 1 << 20;

    /// Read status register 1. Bit 0 ([`STATUS_BUSY`]) is set while an
    /// erase or program is running.
    fn read_status(&mut self) -> u8;

    /// Set the write enable latch.
    fn write_enable(&mut self);

    /// Start erasing the block at `address`.
    fn erase_block(&mut self, address: u32);

    /// Start programming `src` at `address`, using the quad page program
    /// command. `src` never crosses a [`PAGE_SIZE`](DfuFlash::PAGE_SIZE)
    /// boundary.
    fn quad_page_program(&mut self, src: &[u8], address: u32);

    /// Leave the bootloader and start the application.
    ///
    /// Should not return. If it does, the protocol carries on as if the
    /// request did not happen.
    fn reboot(&mut self);

    /// Handle a vendor request sent to the DFU interface.
    ///
    /// `scratch` is the whole transfer buffer of the DFU class. For a
    /// host-to-device request it already starts with the data stage. For
    /// device-to-host, write the reply to `scratch` and return its length.
    fn vendor_request(&mut self, request: &Request, scratch: &mut [u8]) -> VendorReply {
        let _ = (request, scratch);
        VendorReply::NotMine
    }
}
