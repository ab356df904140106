//! Microsoft OS 2.0 descriptors.
//!
//! The BOS platform capability tells Windows 8.1 and later to fetch
//! [`DESCRIPTOR_SET`] with a vendor request, which binds WinUSB to the
//! device so DFU tools work without an INF file.

use usb_device::control::{Recipient, Request, RequestType};
use usb_device::UsbDirection;

/// `bMS_VendorCode`, the `bRequest` of the descriptor set request.
pub const MS_VENDOR_CODE: u8 = 0x01;

/// `wIndex` of the request that reads the descriptor set.
pub const MS_OS_20_DESCRIPTOR_INDEX: u16 = 0x07;

/// Windows 8.1
pub const WINDOWS_VERSION: u32 = 0x0603_0000;

/// `bDevCapabilityType` of a platform capability.
pub const CAPABILITY_TYPE_PLATFORM: u8 = 0x05;

/// MS OS 2.0 platform capability UUID, D8DD60DF-4589-4CC7-9CD2-659D9E648A9F.
pub const PLATFORM_UUID: [u8; 16] = [
    0xdf, 0x60, 0xdd, 0xd8, 0x89, 0x45, 0xc7, 0x4c, 0x9c, 0xd2, 0x65, 0x9d, 0x9e, 0x64, 0x8a, 0x9f,
];

const SET_HEADER_DESCRIPTOR: u16 = 0x00;
const FEATURE_COMPATIBLE_ID: u16 = 0x03;

const SET_LEN: u16 = 30;

const fn le16(v: u16) -> [u8; 2] {
    v.to_le_bytes()
}

const fn le32(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

/// Descriptor set: header plus a `WINUSB` compatible ID for the whole
/// device.
pub const DESCRIPTOR_SET: [u8; SET_LEN as usize] = {
    let len = le16(0x000a);
    let ty = le16(SET_HEADER_DESCRIPTOR);
    let ver = le32(WINDOWS_VERSION);
    let total = le16(SET_LEN);
    let id_len = le16(0x0014);
    let id_ty = le16(FEATURE_COMPATIBLE_ID);
    [
        // set header
        len[0], len[1], ty[0], ty[1], ver[0], ver[1], ver[2], ver[3], total[0], total[1],
        // compatible ID
        id_len[0], id_len[1], id_ty[0], id_ty[1],
        b'W', b'I', b'N', b'U', b'S', b'B', 0, 0,
        // sub-compatible ID
        0, 0, 0, 0, 0, 0, 0, 0,
    ]
};

/// Body of the BOS platform capability, after `bDevCapabilityType`.
pub const PLATFORM_CAPABILITY: [u8; 25] = {
    let u = PLATFORM_UUID;
    let ver = le32(WINDOWS_VERSION);
    let total = le16(SET_LEN);
    [
        // bReserved
        0,
        u[0], u[1], u[2], u[3], u[4], u[5], u[6], u[7],
        u[8], u[9], u[10], u[11], u[12], u[13], u[14], u[15],
        // dwWindowsVersion
        ver[0], ver[1], ver[2], ver[3],
        // wMSOSDescriptorSetTotalLength
        total[0], total[1],
        MS_VENDOR_CODE,
        // bAltEnumCode
        0,
    ]
};

/// Checks whether `req` asks for [`DESCRIPTOR_SET`].
pub fn is_descriptor_request(req: &Request) -> bool {
    req.direction == UsbDirection::In
        && req.request_type == RequestType::Vendor
        && req.recipient == Recipient::Device
        && req.request == MS_VENDOR_CODE
        && req.index == MS_OS_20_DESCRIPTOR_INDEX
}

/// Answer of a vendor request handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VendorReply {
    /// Handled. For device-to-host requests, send this many bytes of the
    /// scratch area.
    Accept(usize),
    /// Stall the request.
    Reject,
    /// Not a request of this handler, let other classes see it.
    NotMine,
}
