use core::cmp::min;
use core::marker::PhantomData;
use usb_device::device::CONFIGURATION_VALUE;
use usb_device::{class_prelude::*, control::Request};

use crate::dfu::{Completion, Dfu, Reply};
use crate::flash::DfuFlash;
use crate::msos::{self, VendorReply};

const USB_CLASS_APPLICATION_SPECIFIC: u8 = 0xFE;
const USB_SUBCLASS_DFU: u8 = 0x01;
const USB_PROTOCOL_DFU_MODE: u8 = 0x02;

const DESC_DESCTYPE_DFU: u8 = 0x21;

// bmAttributes
const DFU_WILL_DETACH: u8 = 1 << 3;
const DFU_MANIFESTATION_TOLERANT: u8 = 1 << 2;
const DFU_CAN_DNLOAD: u8 = 1 << 0;

const DFU_VERSION: u16 = 0x0101;

// Alternate settings that get an interface string.
const MAX_ZONES: usize = 8;

// Largest control transfer `usb-device` buffers, with its
// `control-buffer-256` feature.
const CONTROL_BUFFER_MAX: usize = 256;

/// DFU mode USB class for `usb-device`.
///
/// One interface with an alternate setting per [`DfuFlash::ZONES`] entry.
/// Also answers the MS OS 2.0 descriptor request and forwards vendor
/// requests for its interface to [`DfuFlash::vendor_request`].
///
/// `N` is the size of each buffer slot and the advertised `wTransferSize`.
/// A download is received in one piece by `usb-device`, so `N` must fit its
/// control buffer: 128 bytes by default, 256 with the `control-buffer-256`
/// feature. Larger values do not build, and a value above the enabled
/// buffer stalls every full-size download.
pub struct DfuClass<B: UsbBus, M: DfuFlash, const N: usize = 128> {
    if_num: InterfaceNumber,
    strings: [Option<StringIndex>; MAX_ZONES],
    dfu: Dfu<M, N>,
    pending: Option<Completion>,
    // a poll has passed since `pending` was queued
    armed: bool,
    _bus: PhantomData<B>,
}

impl<B: UsbBus, M: DfuFlash, const N: usize> DfuClass<B, M, N> {
    const SLOT_FITS: () = assert!(
        N <= CONTROL_BUFFER_MAX,
        "slot size exceeds the usb-device control buffer"
    );

    /// Creates a new [`DfuClass`] with the provided UsbBus and
    /// [`DfuFlash`]
    pub fn new(alloc: &UsbBusAllocator<B>, mem: M) -> Self {
        let _ = Self::SLOT_FITS;
        Self {
            if_num: alloc.interface(),
            strings: core::array::from_fn(|i| (i < M::ZONES.len()).then(|| alloc.string())),
            dfu: Dfu::new(mem),
            pending: None,
            armed: false,
            _bus: PhantomData,
        }
    }

    /// Protocol state machine.
    pub fn dfu(&self) -> &Dfu<M, N> {
        &self.dfu
    }

    /// Advances the flash pipeline. Call it from the idle loop, `poll()`
    /// alone only runs it on USB events.
    pub fn tick(&mut self) {
        self.dfu.tick();
    }

    fn is_mine(&self, req: &Request) -> bool {
        req.recipient == control::Recipient::Interface
            && req.index == u8::from(self.if_num) as u16
    }

    fn class_in(&mut self, xfer: ControlIn<B>, req: Request) {
        match self.dfu.request(&req) {
            Ok(Reply::Status(report)) => {
                let v: [u8; 6] = report.into();
                xfer.accept_with(&v).ok();
            }
            Ok(Reply::State(state)) => {
                xfer.accept_with(&[state as u8]).ok();
            }
            // data-less replies only come from host-to-device requests
            Ok(_) | Err(_) => {
                xfer.reject().ok();
            }
        }
    }

    fn class_out(&mut self, xfer: ControlOut<B>, req: Request) {
        match self.dfu.request(&req) {
            Ok(Reply::Accept(then)) => {
                self.pending = then;
                self.armed = false;
                xfer.accept().ok();
            }
            Ok(Reply::Receive { slot, then }) => {
                let data = xfer.data();
                let len = min(slot.len(), data.len());
                slot[..len].copy_from_slice(&data[..len]);
                xfer.accept().ok();
                self.dfu.complete(then);
            }
            Ok(_) | Err(_) => {
                xfer.reject().ok();
            }
        }
    }
}

impl<B: UsbBus, M: DfuFlash, const N: usize> UsbClass<B> for DfuClass<B, M, N> {
    fn get_configuration_descriptors(
        &self,
        writer: &mut DescriptorWriter,
    ) -> usb_device::Result<()> {
        let detach = M::DETACH_TIMEOUT.to_le_bytes();
        let transfer = Dfu::<M, N>::TRANSFER_SIZE.to_le_bytes();
        let version = DFU_VERSION.to_le_bytes();

        for alt in 0..M::ZONES.len() {
            writer.interface_alt(
                self.if_num,
                alt as u8,
                USB_CLASS_APPLICATION_SPECIFIC,
                USB_SUBCLASS_DFU,
                USB_PROTOCOL_DFU_MODE,
                self.strings.get(alt).copied().flatten(),
            )?;

            // DFU Functional descriptor
            writer.write(
                DESC_DESCTYPE_DFU,
                &[
                    // bmAttributes, no upload
                    DFU_WILL_DETACH | DFU_MANIFESTATION_TOLERANT | DFU_CAN_DNLOAD,
                    // wDetachTimeOut
                    detach[0],
                    detach[1],
                    // wTransferSize
                    transfer[0],
                    transfer[1],
                    // bcdDFUVersion
                    version[0],
                    version[1],
                ],
            )?;
        }

        Ok(())
    }

    fn get_bos_descriptors(&self, writer: &mut BosWriter) -> usb_device::Result<()> {
        writer.capability(msos::CAPABILITY_TYPE_PLATFORM, &msos::PLATFORM_CAPABILITY)
    }

    fn get_string(&self, index: StringIndex, lang_id: LangID) -> Option<&str> {
        if lang_id != LangID::EN_US && u16::from(lang_id) != 0 {
            return None;
        }
        let alt = self.strings.iter().position(|s| *s == Some(index))?;
        M::ZONES.get(alt).map(|zone| zone.name)
    }

    // Handle control requests to the host.
    fn control_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();

        if msos::is_descriptor_request(&req) {
            xfer.accept_with_static(&msos::DESCRIPTOR_SET).ok();
            return;
        }

        if !self.is_mine(&req) {
            return;
        }

        match req.request_type {
            control::RequestType::Vendor => match self.dfu.vendor_request(&req, &[]) {
                VendorReply::Accept(len) => {
                    let len = min(len, req.length as usize);
                    xfer.accept_with(&self.dfu.scratch()[..len]).ok();
                }
                VendorReply::Reject => {
                    xfer.reject().ok();
                }
                VendorReply::NotMine => {}
            },
            control::RequestType::Class => self.class_in(xfer, req),
            _ => {}
        }
    }

    // Handle a control request from the host.
    fn control_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();

        // Observed only, usb-device answers it.
        if req.request_type == control::RequestType::Standard
            && req.recipient == control::Recipient::Device
            && req.request == control::Request::SET_CONFIGURATION
            && req.value == CONFIGURATION_VALUE as u16
        {
            self.pending = None;
            self.armed = false;
            self.dfu.configured();
            return;
        }

        if !self.is_mine(&req) {
            return;
        }

        match req.request_type {
            control::RequestType::Vendor => match self.dfu.vendor_request(&req, xfer.data()) {
                VendorReply::Accept(_) => {
                    xfer.accept().ok();
                }
                VendorReply::Reject => {
                    xfer.reject().ok();
                }
                VendorReply::NotMine => {}
            },
            control::RequestType::Class => self.class_out(xfer, req),
            _ => {}
        }
    }

    fn get_alt_setting(&mut self, interface: InterfaceNumber) -> Option<u8> {
        (interface == self.if_num).then(|| self.dfu.alt_setting())
    }

    fn set_alt_setting(&mut self, interface: InterfaceNumber, alternative: u8) -> bool {
        if interface != self.if_num {
            return false;
        }
        self.dfu.select_zone(alternative).is_ok()
    }

    fn reset(&mut self) {
        self.pending = None;
        self.armed = false;
        // may not return
        self.dfu.bus_reset();
    }

    fn poll(&mut self) {
        // The poll right after the request only has the status stage
        // queued. Wait for the next event, normally its IN completion.
        if let Some(then) = self.pending {
            if self.armed {
                self.pending = None;
                self.armed = false;
                self.dfu.complete(then);
            } else {
                self.armed = true;
            }
        }
        self.dfu.tick();
    }
}
