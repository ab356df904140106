//! RAM backed flash for unit tests.
//!
//! Behaves like a NOR chip: erase sets a whole block to `0xff`, program can
//! only clear bits. Every erase or program keeps the busy bit set for a
//! configurable number of status reads, and any command sent while busy,
//! without write enable, across a page, or onto bytes that were not erased
//! panics.

use usb_device::control::Request;

use crate::flash::{DfuFlash, STATUS_BUSY};
use crate::msos::VendorReply;
use crate::zone::Zone;

pub const FAKE_SIZE: usize = 0x1_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cmd {
    Erase(u32),
    Program(u32, usize),
}

pub struct FakeFlash {
    pub memory: Vec<u8>,
    pub log: Vec<Cmd>,
    pub reboots: u32,
    pub status_reads: u32,
    pub erase_busy: u32,
    pub program_busy: u32,
    pub vendor_calls: u32,
    pub vendor_scratch_len: usize,
    busy_left: u32,
    wel: bool,
}

impl FakeFlash {
    pub fn new() -> Self {
        Self {
            memory: vec![0x5a; FAKE_SIZE],
            log: Vec::new(),
            reboots: 0,
            status_reads: 0,
            erase_busy: 3,
            program_busy: 1,
            vendor_calls: 0,
            vendor_scratch_len: 0,
            busy_left: 0,
            wel: false,
        }
    }

    pub fn busy(&self) -> bool {
        self.busy_left > 0
    }

    pub fn erases(&self) -> Vec<u32> {
        self.log
            .iter()
            .filter_map(|c| match c {
                Cmd::Erase(a) => Some(*a),
                _ => None,
            })
            .collect()
    }

    pub fn read(&self, address: u32, len: usize) -> &[u8] {
        let a = address as usize;
        &self.memory[a..a + len]
    }

    fn start(&mut self, busy: u32) {
        assert_eq!(self.busy_left, 0, "command issued while flash is busy");
        assert!(self.wel, "command issued without write enable");
        self.wel = false;
        self.busy_left = busy;
    }
}

impl DfuFlash for FakeFlash {
    const ZONES: &'static [Zone] = &[
        Zone::new("alpha", 0x1000, 0x2000),
        Zone::new("beta", 0x2000, 0x4000),
    ];
    const ERASE_BLOCK_SIZE: u32 = 0x1000;
    const PAGE_SIZE: u32 = 256;
    const POLL_TIMEOUT_MS: u32 = 5;

    fn read_status(&mut self) -> u8 {
        self.status_reads += 1;
        if self.busy_left > 0 {
            self.busy_left -= 1;
            STATUS_BUSY
        } else {
            0
        }
    }

    fn write_enable(&mut self) {
        assert_eq!(self.busy_left, 0, "write enable while flash is busy");
        self.wel = true;
    }

    fn erase_block(&mut self, address: u32) {
        self.start(self.erase_busy);
        self.log.push(Cmd::Erase(address));
        let block = Self::ERASE_BLOCK_SIZE as usize;
        let base = address as usize / block * block;
        self.memory[base..base + block].fill(0xff);
    }

    fn quad_page_program(&mut self, src: &[u8], address: u32) {
        self.start(self.program_busy);
        let page = Self::PAGE_SIZE as usize;
        let a = address as usize;
        assert!(
            a % page + src.len() <= page,
            "program crosses a page at {:#x}",
            a
        );
        assert!(
            self.memory[a..a + src.len()].iter().all(|b| *b == 0xff),
            "program of non-erased flash at {:#x}",
            a
        );
        self.log.push(Cmd::Program(address, src.len()));
        for (m, s) in self.memory[a..a + src.len()].iter_mut().zip(src) {
            *m &= *s;
        }
    }

    fn reboot(&mut self) {
        self.reboots += 1;
    }

    fn vendor_request(&mut self, request: &Request, scratch: &mut [u8]) -> VendorReply {
        self.vendor_calls += 1;
        self.vendor_scratch_len = scratch.len();
        match request.request {
            // echo the data stage back, reversed
            0x10 => {
                let len = request.length as usize;
                scratch[..len].reverse();
                VendorReply::Accept(len)
            }
            0x11 => VendorReply::Reject,
            _ => VendorReply::NotMine,
        }
    }
}
