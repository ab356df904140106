#![allow(dead_code)]
use usb_device::class::UsbClass;
use usbd_class_tester::prelude::*;

// bState values reported by the device
pub const DFU_IDLE: u8 = 2;
pub const DFU_DNLOAD_SYNC: u8 = 3;
pub const DFU_DN_BUSY: u8 = 4;
pub const DFU_DNLOAD_IDLE: u8 = 5;
pub const DFU_MANIFEST_SYNC: u8 = 6;
pub const DFU_ERROR: u8 = 10;

pub const STATUS_OK: u8 = 0x00;
pub const STATUS_ERR_UNKNOWN: u8 = 0x0E;

// Standard requests
const GET_DESCRIPTOR: u8 = 0x06;
const SET_CONFIGURATION: u8 = 0x09;
const GET_INTERFACE: u8 = 0x0a;
const SET_INTERFACE: u8 = 0x0b;

pub trait DeviceExt<C> {
    fn read(
        &mut self,
        cls: &mut C,
        req: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> AnyResult<Vec<u8>>;
    fn write(
        &mut self,
        cls: &mut C,
        req: u8,
        value: u16,
        index: u16,
        length: u16,
        data: &[u8],
    ) -> AnyResult<Vec<u8>>;

    fn detach(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;
    fn download(&mut self, cls: &mut C, block_num: u16, data: &[u8]) -> AnyResult<Vec<u8>>;
    fn upload(&mut self, cls: &mut C, block_num: u16, length: usize) -> AnyResult<Vec<u8>>;
    fn get_status(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;
    fn clear_status(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;
    fn get_state(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;
    fn abort(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;

    fn configure(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;
    fn set_alt(&mut self, cls: &mut C, alt: u16) -> AnyResult<Vec<u8>>;
    fn get_alt(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;
    fn get_config_descriptor(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;
    fn get_bos_descriptor(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;
    fn get_string(&mut self, cls: &mut C, index: u8) -> AnyResult<String>;

    fn vendor_read(&mut self, cls: &mut C, req: u8, length: u16) -> AnyResult<Vec<u8>>;
    fn vendor_write(&mut self, cls: &mut C, req: u8, data: &[u8]) -> AnyResult<Vec<u8>>;
    fn msos_descriptor(&mut self, cls: &mut C) -> AnyResult<Vec<u8>>;
}

impl<'a, C, M> DeviceExt<C> for Device<'a, C, M>
where
    C: UsbClass<EmulatedUsbBus>,
    M: UsbDeviceCtx<C<'a> = C>,
{
    fn read(
        &mut self,
        cls: &mut C,
        req: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> AnyResult<Vec<u8>> {
        self.control_read(
            cls,
            CtrRequestType::to_host().class().interface(),
            req,
            value,
            index,
            length,
        )
    }

    fn write(
        &mut self,
        cls: &mut C,
        req: u8,
        value: u16,
        index: u16,
        length: u16,
        data: &[u8],
    ) -> AnyResult<Vec<u8>> {
        self.control_write(
            cls,
            CtrRequestType::to_device().class().interface(),
            req,
            value,
            index,
            length,
            data,
        )
    }

    fn detach(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.write(cls, 0x0, 1000, 0, 0, &[])
    }

    fn download(&mut self, cls: &mut C, block_num: u16, data: &[u8]) -> AnyResult<Vec<u8>> {
        if data.len() > u16::MAX as usize {
            return Err(AnyUsbError::DataConversion);
        }
        self.write(cls, 0x1, block_num, 0, data.len() as u16, data)
    }

    fn upload(&mut self, cls: &mut C, block_num: u16, length: usize) -> AnyResult<Vec<u8>> {
        if length > u16::MAX as usize {
            return Err(AnyUsbError::DataConversion);
        }
        self.read(cls, 0x2, block_num, 0, length as u16)
    }

    fn get_status(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.read(cls, 0x3, 0, 0, 6)
    }

    fn clear_status(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.write(cls, 0x4, 0, 0, 0, &[])
    }

    fn get_state(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.read(cls, 0x5, 0, 0, 1)
    }

    fn abort(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.write(cls, 0x6, 0, 0, 0, &[])
    }

    fn configure(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.control_write(
            cls,
            CtrRequestType::to_device(),
            SET_CONFIGURATION,
            1,
            0,
            0,
            &[],
        )
    }

    fn set_alt(&mut self, cls: &mut C, alt: u16) -> AnyResult<Vec<u8>> {
        self.control_write(
            cls,
            CtrRequestType::to_device().interface(),
            SET_INTERFACE,
            alt,
            0,
            0,
            &[],
        )
    }

    fn get_alt(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.control_read(
            cls,
            CtrRequestType::to_host().interface(),
            GET_INTERFACE,
            0,
            0,
            1,
        )
    }

    fn get_config_descriptor(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.control_read(cls, CtrRequestType::to_host(), GET_DESCRIPTOR, 0x0200, 0, 255)
    }

    fn get_bos_descriptor(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.control_read(cls, CtrRequestType::to_host(), GET_DESCRIPTOR, 0x0f00, 0, 255)
    }

    fn get_string(&mut self, cls: &mut C, index: u8) -> AnyResult<String> {
        let vec = self.control_read(
            cls,
            CtrRequestType::to_host(),
            GET_DESCRIPTOR,
            0x0300 | index as u16,
            0x0409,
            255,
        )?;
        let u16v: Vec<u16> = vec[2..]
            .chunks(2)
            .map(|v| u16::from_le_bytes([v[0], v[1]]))
            .collect();
        String::from_utf16(&u16v).map_err(|_| AnyUsbError::DataConversion)
    }

    fn vendor_read(&mut self, cls: &mut C, req: u8, length: u16) -> AnyResult<Vec<u8>> {
        self.control_read(
            cls,
            CtrRequestType::to_host().vendor().interface(),
            req,
            0,
            0,
            length,
        )
    }

    fn vendor_write(&mut self, cls: &mut C, req: u8, data: &[u8]) -> AnyResult<Vec<u8>> {
        self.control_write(
            cls,
            CtrRequestType::to_device().vendor().interface(),
            req,
            0,
            0,
            data.len() as u16,
            data,
        )
    }

    fn msos_descriptor(&mut self, cls: &mut C) -> AnyResult<Vec<u8>> {
        self.control_read(cls, CtrRequestType::to_host().vendor(), 0x01, 0, 0x07, 255)
    }
}

pub fn status(status: u8, poll_timeout: u32, state: u8) -> [u8; 6] {
    let t = poll_timeout.to_le_bytes();
    [status, t[0], t[1], t[2], state, 0]
}

/// Splits a configuration descriptor into its descriptors.
pub fn descriptors(buf: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut rest = buf;
    while let Some(&len) = rest.first() {
        let len = len as usize;
        if len == 0 || len > rest.len() {
            break;
        }
        out.push(&rest[..len]);
        rest = &rest[len..];
    }
    out
}
