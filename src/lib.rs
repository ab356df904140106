#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
//!
//! DFU bootloader core for a badge with an FPGA bitstream and a soft CPU
//! image in one SPI NOR flash, on top of `usb-device`.
//!
//! ## About
//!
//! The host writes firmware with the DFU 1.1 download sequence. Every
//! alternate setting of the DFU interface targets one flash [`Zone`], for
//! example the bitstream or the CPU firmware, so one device can update
//! several images independently.
//!
//! Data is received into one of two buffer slots while the other slot is
//! erased and programmed. Flash work is non-blocking: each
//! [`tick()`](DfuClass::tick) issues at most one erase or program command
//! and returns while the chip is busy, so the main loop stays responsive
//! to USB.
//!
//! ### Supported operations
//!
//! * Write (host to device) - download command
//! * Detach - reboot to the application, also in DFU mode
//! * Microsoft OS 2.0 descriptors, Windows binds WinUSB without a driver
//! * Vendor requests to the DFU interface, see [`DfuFlash::vendor_request`]
//!
//! ### Not supported operations
//!
//! * Read (device to host) - upload command is always stalled.
//!
//! ### Limitations
//!
//! * Transfer size is the slot size `N` of [`DfuClass`], it must not be
//! larger than `usb-device`'s control buffer, which is `128` bytes by
//! default.
//!
//! * Erase and program results are not verified, a failing flash chip only
//! shows up as a corrupt image.
//!
//! * iString field in `DFU_GETSTATUS` is always `0`.
//!
//! ## DFU utilities
//!
//! Any DFU 1.1 host tool works, for example
//! [dfu-util](http://dfu-util.sourceforge.net/):
//!
//! ```text
//! dfu-util -d 1d50:614b -a 0 -D bitstream.bin
//! dfu-util -d 1d50:614b -a 1 -D firmware.bin -R
//! ```
//!
//! ## Example
//!
//! The example below focuses on [`DfuClass`] and [`DfuFlash`], target
//! controller setup (clocks, SPI, USB peripheral) is out of its scope.
//!
//! ```no_run
//! use badge_dfu::{DfuClass, DfuFlash, Zone, BADGE_ZONES};
//! use usb_device::bus::{UsbBus, UsbBusAllocator};
//! use usb_device::prelude::*;
//!
//! struct BadgeFlash {
//!     // SPI peripheral, chip select...
//! }
//!
//! impl BadgeFlash {
//!     fn transfer(&mut self, _command: &[u8], _data: &[u8], _reply: &mut [u8]) {
//!         // assert chip select, shift out command and data, read reply
//!     }
//! }
//!
//! impl DfuFlash for BadgeFlash {
//!     const ZONES: &'static [Zone] = &BADGE_ZONES;
//!
//!     fn read_status(&mut self) -> u8 {
//!         let mut sr = [0u8];
//!         self.transfer(&[0x05], &[], &mut sr);
//!         sr[0]
//!     }
//!
//!     fn write_enable(&mut self) {
//!         self.transfer(&[0x06], &[], &mut []);
//!     }
//!
//!     fn erase_block(&mut self, address: u32) {
//!         let a = address.to_be_bytes();
//!         self.transfer(&[0xd8, a[1], a[2], a[3]], &[], &mut []);
//!     }
//!
//!     fn quad_page_program(&mut self, src: &[u8], address: u32) {
//!         let a = address.to_be_bytes();
//!         self.transfer(&[0x32, a[1], a[2], a[3]], src, &mut []);
//!     }
//!
//!     fn reboot(&mut self) {
//!         // reset into the application image
//!         loop {}
//!     }
//! }
//!
//! fn bootloader<B: UsbBus>(alloc: &UsbBusAllocator<B>, flash: BadgeFlash) -> ! {
//!     // DfuClass must be created before the device so its interface and
//!     // strings get allocated.
//!     let mut dfu: DfuClass<B, BadgeFlash> = DfuClass::new(alloc, flash);
//!
//!     let mut usb_dev = UsbDeviceBuilder::new(alloc, UsbVidPid(0x1d50, 0x614b))
//!         .strings(&[StringDescriptors::default().product("Badge DFU")])
//!         .unwrap()
//!         .build();
//!
//!     loop {
//!         usb_dev.poll(&mut [&mut dfu]);
//!         // keep erasing/programming between USB events
//!         dfu.tick();
//!     }
//! }
//! ```
//!

mod fmt;

/// USB class binding
pub mod class;
/// DFU protocol state machine
pub mod dfu;
/// Flash and board interface
pub mod flash;
/// Microsoft OS 2.0 descriptors
pub mod msos;
/// Double buffer and erase/program pipeline
pub mod pipeline;
/// DFU states, status codes and request legality
pub mod state;
/// Flash zones
pub mod zone;

#[cfg(test)]
mod fake;

#[doc(inline)]
pub use crate::class::DfuClass;
#[doc(inline)]
pub use crate::dfu::{Completion, Dfu, DfuError, Reply};
#[doc(inline)]
pub use crate::flash::DfuFlash;
#[doc(inline)]
pub use crate::msos::VendorReply;
#[doc(inline)]
pub use crate::state::{DfuState, DfuStatusCode, RequestKind, StatusReport};
#[doc(inline)]
pub use crate::zone::{Zone, ZoneError, BADGE_ZONES};
