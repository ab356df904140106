// DFU class request opcodes (bRequest)
const DFU_DETACH: u8 = 0x00;
const DFU_DNLOAD: u8 = 0x01;
const DFU_UPLOAD: u8 = 0x02;
const DFU_GETSTATUS: u8 = 0x03;
const DFU_CLRSTATUS: u8 = 0x04;
const DFU_GETSTATE: u8 = 0x05;
const DFU_ABORT: u8 = 0x06;

/// DFU protocol state, as reported in `bState`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuState {
    /// Running the application, DFU not active.
    AppIdle = 0,
    /// Waiting for a USB reset to switch modes. This is also the state the
    /// bootloader starts in, before the host configures the device.
    AppDetach = 1,
    /// DFU mode, waiting for requests.
    DfuIdle = 2,
    /// A block was received, waiting for `DFU_GETSTATUS`.
    DfuDnloadSync = 3,
    /// Both buffers are queued for programming. Reported only.
    DfuDnBusy = 4,
    /// Ready for the next `DFU_DNLOAD` block.
    DfuDnloadIdle = 5,
    /// The final (empty) block was received.
    DfuManifestSync = 6,
    /// Queued data is still being written. Reported only.
    DfuManifest = 7,
    /// Not used by this device, manifestation tolerant.
    DfuManifestWaitReset = 8,
    /// Not used by this device, upload is not supported.
    DfuUploadIdle = 9,
    /// Error, waiting for `DFU_CLRSTATUS`.
    DfuError = 10,
}

/// DFU status code, as reported in `bStatus`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuStatusCode {
    /// No error condition is present.
    Ok = 0x00,
    /// File is not targeted for use by this device.
    ErrTarget = 0x01,
    /// File fails some vendor-specific verification test.
    ErrFile = 0x02,
    /// Device is unable to write memory.
    ErrWrite = 0x03,
    /// Memory erase function failed.
    ErrErase = 0x04,
    /// Memory erase check failed.
    ErrCheckErased = 0x05,
    /// Program memory function failed.
    ErrProg = 0x06,
    /// Programmed memory failed verification.
    ErrVerify = 0x07,
    /// Received address is out of range.
    ErrAddress = 0x08,
    /// Empty `DFU_DNLOAD` before all data was received.
    ErrNotdone = 0x09,
    /// Firmware is corrupt, cannot return to run-time operation.
    ErrFirmware = 0x0A,
    /// Vendor-specific error.
    ErrVendor = 0x0B,
    /// Unexpected USB reset.
    ErrUsbr = 0x0C,
    /// Unexpected power on reset.
    ErrPOR = 0x0D,
    /// Something went wrong, but the device does not know what it was.
    ErrUnknown = 0x0E,
    /// Device stalled an unexpected request.
    ErrStalledPkt = 0x0F,
}

/// Kind of a DFU class request.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestKind {
    /// `DFU_DETACH`, reboot to the application.
    Detach = DFU_DETACH,
    /// `DFU_DNLOAD`, one block of firmware or the empty final block.
    Dnload = DFU_DNLOAD,
    /// `DFU_UPLOAD`, always refused.
    Upload = DFU_UPLOAD,
    /// `DFU_GETSTATUS`
    GetStatus = DFU_GETSTATUS,
    /// `DFU_CLRSTATUS`
    ClrStatus = DFU_CLRSTATUS,
    /// `DFU_GETSTATE`
    GetState = DFU_GETSTATE,
    /// `DFU_ABORT`
    Abort = DFU_ABORT,
}

impl TryFrom<u8> for RequestKind {
    type Error = u8;

    fn try_from(request: u8) -> Result<Self, u8> {
        Ok(match request {
            DFU_DETACH => RequestKind::Detach,
            DFU_DNLOAD => RequestKind::Dnload,
            DFU_UPLOAD => RequestKind::Upload,
            DFU_GETSTATUS => RequestKind::GetStatus,
            DFU_CLRSTATUS => RequestKind::ClrStatus,
            DFU_GETSTATE => RequestKind::GetState,
            DFU_ABORT => RequestKind::Abort,
            other => return Err(other),
        })
    }
}

/// A set of request kinds, one bit per opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestSet(u8);

impl RequestSet {
    /// No request allowed.
    pub const EMPTY: RequestSet = RequestSet(0);

    /// Returns the set extended with `kind`.
    pub const fn with(self, kind: RequestKind) -> Self {
        RequestSet(self.0 | (1 << kind as u8))
    }

    /// Checks whether `kind` is in the set.
    pub const fn contains(self, kind: RequestKind) -> bool {
        self.0 & (1 << kind as u8) != 0
    }
}

const STATUS_ONLY: RequestSet = RequestSet::EMPTY
    .with(RequestKind::GetStatus)
    .with(RequestKind::GetState);

impl DfuState {
    /// Requests the host may send while the device is in this state.
    ///
    /// Everything else moves the device to `dfuError`.
    pub const fn allowed_requests(self) -> RequestSet {
        match self {
            DfuState::AppIdle => STATUS_ONLY.with(RequestKind::Detach),
            DfuState::AppDetach => STATUS_ONLY,
            // Detach in dfuIDLE is not standard, it reboots to the application.
            DfuState::DfuIdle => STATUS_ONLY
                .with(RequestKind::Detach)
                .with(RequestKind::Dnload)
                .with(RequestKind::Upload)
                .with(RequestKind::Abort),
            DfuState::DfuDnloadSync | DfuState::DfuDnloadIdle => {
                STATUS_ONLY.with(RequestKind::Dnload).with(RequestKind::Abort)
            }
            DfuState::DfuManifestSync => STATUS_ONLY.with(RequestKind::Abort),
            DfuState::DfuUploadIdle => STATUS_ONLY
                .with(RequestKind::Upload)
                .with(RequestKind::Abort),
            DfuState::DfuError => STATUS_ONLY.with(RequestKind::ClrStatus),
            DfuState::DfuDnBusy | DfuState::DfuManifest | DfuState::DfuManifestWaitReset => {
                RequestSet::EMPTY
            }
        }
    }
}

/// Reply to `DFU_GETSTATUS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusReport {
    /// `bStatus`
    pub status: DfuStatusCode,
    /// Milliseconds the host should wait before the next request, 24 bits.
    pub poll_timeout: u32,
    /// `bState`, which may differ from the internal state.
    pub state: DfuState,
}

impl From<StatusReport> for [u8; 6] {
    fn from(report: StatusReport) -> Self {
        let t = report.poll_timeout.to_le_bytes();
        [
            // bStatus
            report.status as u8,
            // bwPollTimeout
            t[0],
            t[1],
            t[2],
            // bState
            report.state as u8,
            // iString
            0,
        ]
    }
}
