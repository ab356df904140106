use core::cmp::min;

use usb_device::control::Request;
use usb_device::UsbDirection;

use crate::flash::DfuFlash;
use crate::msos::VendorReply;
use crate::pipeline::{FlashCursor, Pipeline};
use crate::state::{DfuState, DfuStatusCode, RequestKind, StatusReport};
use crate::zone::{self, Zone, ZoneError};

/// Why a DFU request was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuError {
    /// `bRequest` is not a DFU opcode.
    UnknownRequest(u8),
    /// The request is not allowed in the current state.
    IllegalRequest {
        /// Refused request.
        request: RequestKind,
        /// State the device was in.
        state: DfuState,
    },
    /// Data stage direction does not match the request.
    WrongDirection,
    /// The request is legal but this device does not implement it.
    Unsupported(RequestKind),
    /// The download would write past the end of the selected zone.
    ZoneOverflow,
    /// The download does not fit a buffer slot.
    TransferTooLarge,
    /// Both buffer slots are still queued for programming.
    BuffersFull,
}

impl DfuError {
    /// Returns `true` if the error moves the device to `dfuError`.
    ///
    /// [`BuffersFull`](DfuError::BuffersFull) only stalls the request, the
    /// host is expected to poll `DFU_GETSTATUS` until the device leaves
    /// `dfuDnBusy`.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, DfuError::BuffersFull)
    }
}

/// Work to run after the data or status stage of a request completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Completion {
    /// Reboot to the application.
    Detach,
    /// The slot returned with [`Reply::Receive`] holds new data.
    Download,
}

/// Outcome of an accepted DFU request.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply<'a> {
    /// Accept without data. Run the completion, if any, once the status
    /// stage is done.
    Accept(Option<Completion>),
    /// Answer with a `DFU_GETSTATUS` report.
    Status(StatusReport),
    /// Answer with the `bState` byte.
    State(DfuState),
    /// Copy the data stage into `slot`, then run `then`.
    Receive {
        /// Destination of the data stage, exactly `wLength` bytes.
        slot: &'a mut [u8],
        /// Completion to run once `slot` is filled.
        then: Completion,
    },
}

/// DFU protocol state machine and its flash pipeline.
///
/// Transport independent: [`DfuClass`](crate::class::DfuClass) feeds it from
/// `usb-device`, tests call it directly. `N` is the size of each of the two
/// buffer slots and the advertised `wTransferSize`.
pub struct Dfu<M: DfuFlash, const N: usize = 128> {
    mem: M,
    state: DfuState,
    status: DfuStatusCode,
    alt: u8,
    pipeline: Pipeline<N>,
}

impl<M: DfuFlash, const N: usize> Dfu<M, N> {
    /// `wTransferSize` advertised in the functional descriptor.
    pub const TRANSFER_SIZE: u16 = {
        assert!(N > 0 && N <= u16::MAX as usize, "slot size must fit wTransferSize");
        N as u16
    };

    /// Creates the state machine in `appDETACH`, waiting for the host to
    /// configure the device.
    pub fn new(mem: M) -> Self {
        let _ = Self::TRANSFER_SIZE;
        Self {
            mem,
            state: DfuState::AppDetach,
            status: DfuStatusCode::Ok,
            alt: 0,
            pipeline: Pipeline::new(),
        }
    }

    /// Current internal state.
    pub fn state(&self) -> DfuState {
        self.state
    }

    /// Current status code.
    pub fn status(&self) -> DfuStatusCode {
        self.status
    }

    /// Last successfully selected alternate setting.
    pub fn alt_setting(&self) -> u8 {
        self.alt
    }

    /// Buffer slots waiting to be written, `0..=2`.
    pub fn buffers_used(&self) -> usize {
        self.pipeline.buffer().used()
    }

    /// Flash addresses of the pipeline.
    pub fn cursor(&self) -> FlashCursor {
        self.pipeline.cursor()
    }

    /// Flash backend.
    pub fn mem(&self) -> &M {
        &self.mem
    }

    /// Mutable flash backend.
    pub fn mem_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    /// Both buffer slots, as left by the last vendor request.
    pub fn scratch(&self) -> &[u8] {
        self.pipeline.scratch()
    }

    /// Advances the flash pipeline by at most one command.
    pub fn tick(&mut self) {
        self.pipeline.tick(&mut self.mem);
    }

    fn fail(&mut self, err: DfuError) -> DfuError {
        if err.is_protocol_violation() {
            warn!("dfu: {} in {}, stalling", err, self.state);
            self.state = DfuState::DfuError;
            self.status = DfuStatusCode::ErrUnknown;
        } else {
            debug!("dfu: {}, stalling", err);
        }
        err
    }

    /// Handles a DFU class request addressed to the DFU interface.
    ///
    /// On `Err` the request must be stalled. Protocol violations have
    /// already moved the machine to `dfuError` by then.
    pub fn request(&mut self, req: &Request) -> Result<Reply<'_>, DfuError> {
        let kind = match RequestKind::try_from(req.request) {
            Ok(kind) => kind,
            Err(op) => return Err(self.fail(DfuError::UnknownRequest(op))),
        };

        let device_to_host = matches!(
            kind,
            RequestKind::Upload | RequestKind::GetStatus | RequestKind::GetState
        );
        if device_to_host != (req.direction == UsbDirection::In) {
            return Err(self.fail(DfuError::WrongDirection));
        }

        if !self.state.allowed_requests().contains(kind) {
            return Err(self.fail(DfuError::IllegalRequest {
                request: kind,
                state: self.state,
            }));
        }

        match kind {
            RequestKind::Detach => Ok(Reply::Accept(Some(Completion::Detach))),
            RequestKind::Dnload if req.length == 0 => {
                debug!("dfu: final block");
                self.state = DfuState::DfuManifestSync;
                Ok(Reply::Accept(None))
            }
            RequestKind::Dnload => {
                let len = req.length as usize;
                if let Err(err) = self.pipeline.reserve(len) {
                    return Err(self.fail(err));
                }
                Ok(Reply::Receive {
                    slot: self.pipeline.writable(len),
                    then: Completion::Download,
                })
            }
            RequestKind::Upload => Err(self.fail(DfuError::Unsupported(kind))),
            RequestKind::GetStatus => Ok(Reply::Status(self.get_status())),
            RequestKind::ClrStatus => {
                self.state = DfuState::DfuIdle;
                self.status = DfuStatusCode::Ok;
                Ok(Reply::Accept(None))
            }
            RequestKind::GetState => Ok(Reply::State(self.state)),
            RequestKind::Abort => {
                self.state = DfuState::DfuIdle;
                Ok(Reply::Accept(None))
            }
        }
    }

    /// Runs the completion of a request accepted by
    /// [`request()`](Dfu::request).
    pub fn complete(&mut self, then: Completion) {
        match then {
            Completion::Detach => {
                info!("dfu: detach, rebooting");
                self.mem.reboot();
            }
            Completion::Download => {
                self.pipeline.commit();
                self.state = DfuState::DfuDnloadSync;
            }
        }
    }

    fn get_status(&mut self) -> StatusReport {
        let reported = match self.state {
            DfuState::DfuDnloadSync => {
                if self.pipeline.buffer().is_full() {
                    DfuState::DfuDnBusy
                } else {
                    self.state = DfuState::DfuDnloadIdle;
                    self.state
                }
            }
            // Draining here and answering dfuIDLE right away keeps dfu-util
            // from waiting out its manifestation delay.
            DfuState::DfuManifestSync => {
                if self.drain() {
                    self.state = DfuState::DfuIdle;
                    self.state
                } else {
                    DfuState::DfuManifest
                }
            }
            state => state,
        };

        StatusReport {
            status: self.status,
            poll_timeout: M::POLL_TIMEOUT_MS,
            state: reported,
        }
    }

    fn drain(&mut self) -> bool {
        for _ in 0..M::MANIFEST_DRAIN_LIMIT {
            if self.pipeline.buffer().is_empty() {
                return true;
            }
            self.tick();
        }
        let done = self.pipeline.buffer().is_empty();
        if !done {
            warn!("dfu: manifest drain gave up, {=usize} queued", self.buffers_used());
        }
        done
    }

    fn home(&mut self, zone: &Zone) {
        debug_assert!(
            zone.is_aligned(M::ERASE_BLOCK_SIZE),
            "zone not on erase block boundaries"
        );
        debug_assert!(
            zone.len() as usize % N == 0,
            "zone length not a multiple of the transfer size"
        );
        self.pipeline.rehome(zone);
    }

    /// USB bus reset. Reboots to the application unless the device is
    /// still waiting to be configured.
    pub fn bus_reset(&mut self) {
        if self.state != DfuState::AppDetach {
            info!("dfu: bus reset in {}, rebooting", self.state);
            self.mem.reboot();
        }
    }

    /// The host configured the device. Enters `dfuIDLE` on alternate
    /// setting 0, an error state is kept until cleared.
    pub fn configured(&mut self) {
        self.alt = 0;
        match zone::lookup(M::ZONES, 0) {
            Ok(zone) => self.home(&zone),
            Err(_) => warn!("dfu: no flash zone defined"),
        }
        if self.state != DfuState::DfuError {
            self.state = DfuState::DfuIdle;
        }
    }

    /// Selects the flash zone of alternate setting `alt`.
    ///
    /// Queued data and cursors of the previous zone are dropped. The status
    /// code is left as is.
    pub fn select_zone(&mut self, alt: u8) -> Result<Zone, ZoneError> {
        let zone = zone::lookup(M::ZONES, alt)?;
        info!(
            "dfu: alt {=u8}, {=u32:#x}..{=u32:#x}",
            alt,
            zone.start,
            zone.end
        );
        self.home(&zone);
        self.alt = alt;
        self.state = DfuState::DfuIdle;
        Ok(zone)
    }

    /// Offers a vendor request to [`DfuFlash::vendor_request`], lending it
    /// both buffer slots.
    ///
    /// `data` is the data stage of a host-to-device request and is copied
    /// to the start of the scratch area. Refused while firmware data is
    /// queued. The length of an `Accept` never exceeds the scratch area,
    /// read the answer back with [`scratch()`](Dfu::scratch).
    pub fn vendor_request(&mut self, req: &Request, data: &[u8]) -> VendorReply {
        if !self.pipeline.buffer().is_empty() {
            warn!("dfu: vendor request {=u8} while writing", req.request);
            return VendorReply::Reject;
        }

        let scratch = self.pipeline.scratch_mut();
        let len = min(data.len(), scratch.len());
        scratch[..len].copy_from_slice(&data[..len]);

        trace!("dfu: vendor request {=u8}", req.request);
        match self.mem.vendor_request(req, scratch) {
            VendorReply::Accept(n) => VendorReply::Accept(min(n, scratch.len())),
            other => other,
        }
    }
}
