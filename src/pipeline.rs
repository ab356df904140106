use core::cmp::min;

use crate::dfu::DfuError;
use crate::flash::{DfuFlash, STATUS_BUSY};
use crate::zone::Zone;

/// Two transfer-sized slots. USB fills one while the pipeline writes the
/// other to flash.
pub struct DoubleBuffer<const N: usize> {
    data: [[u8; N]; 2],
    /// Slot that receives the next transfer.
    wr: usize,
    /// Slot the pipeline is writing out.
    rd: usize,
    /// Slots received and not yet written, 0..=2.
    used: usize,
}

impl<const N: usize> DoubleBuffer<N> {
    const FILL: u8 = 0xff;

    /// Creates an empty buffer.
    pub const fn new() -> Self {
        Self {
            data: [[0; N]; 2],
            wr: 0,
            rd: 0,
            used: 0,
        }
    }

    /// Number of slots waiting to be written to flash.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Returns `true` if no data is queued.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Returns `true` if both slots are queued.
    pub fn is_full(&self) -> bool {
        self.used == 2
    }

    /// Index of the slot that receives the next transfer.
    pub fn write_index(&self) -> usize {
        self.wr
    }

    /// Index of the slot the pipeline is consuming.
    pub fn read_index(&self) -> usize {
        self.rd
    }

    /// Drops all queued data.
    pub fn clear(&mut self) {
        self.wr = 0;
        self.rd = 0;
        self.used = 0;
    }

    // Tail past `len` is filled so a short last block programs as erased flash.
    fn writable(&mut self, len: usize) -> &mut [u8] {
        let slot = &mut self.data[self.wr];
        slot[len..].fill(Self::FILL);
        &mut slot[..len]
    }

    fn commit(&mut self) {
        if self.used < 2 {
            self.wr ^= 1;
            self.used += 1;
        } else {
            warn!("dfu: commit with both slots queued");
        }
    }

    fn readable(&self) -> &[u8; N] {
        &self.data[self.rd]
    }

    fn release(&mut self) {
        self.rd ^= 1;
        self.used = self.used.saturating_sub(1);
    }

    /// Both slots as one area.
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_flattened()
    }

    /// Both slots as one writable area.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_flattened_mut()
    }
}

impl<const N: usize> Default for DoubleBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Flash operation in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashOp {
    /// Nothing running.
    Idle,
    /// Erasing ahead of the slot being written.
    Erasing,
    /// Programming the read slot page by page.
    Programming,
}

/// Addresses tracked by the pipeline.
///
/// `erase` never falls behind `prog`: a page is programmed only after the
/// block holding it was erased.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashCursor {
    /// Start of the slot the next download lands in, checked against
    /// `end`. Moves in whole slots, like `prog`.
    pub recv: u32,
    /// Next address to program.
    pub prog: u32,
    /// Next address to erase.
    pub erase: u32,
    /// End of the selected zone, exclusive.
    pub end: u32,
    /// Current operation.
    pub op: FlashOp,
    /// Progress inside the slot being written.
    pub op_ofs: u32,
    /// Length of the slot being written.
    pub op_len: u32,
}

impl FlashCursor {
    const fn at(start: u32, end: u32) -> Self {
        Self {
            recv: start,
            prog: start,
            erase: start,
            end,
            op: FlashOp::Idle,
            op_ofs: 0,
            op_len: 0,
        }
    }
}

/// Double buffer plus the erase/program state machine that drains it.
pub struct Pipeline<const N: usize> {
    buf: DoubleBuffer<N>,
    cursor: FlashCursor,
}

impl<const N: usize> Pipeline<N> {
    /// Creates a pipeline with an empty zone, nothing can be received until
    /// [`rehome()`](Pipeline::rehome) is called.
    pub const fn new() -> Self {
        Self {
            buf: DoubleBuffer::new(),
            cursor: FlashCursor::at(0, 0),
        }
    }

    /// Queued data.
    pub fn buffer(&self) -> &DoubleBuffer<N> {
        &self.buf
    }

    /// Address state.
    pub fn cursor(&self) -> FlashCursor {
        self.cursor
    }

    /// Moves all cursors to the start of `zone` and drops queued data.
    ///
    /// An erase or program already sent to the chip finishes on its own,
    /// its result is left as is.
    pub fn rehome(&mut self, zone: &Zone) {
        self.cursor = FlashCursor::at(zone.start, zone.end);
        self.buf.clear();
    }

    /// Accounts for a download of `len` bytes.
    ///
    /// Checks that a slot is free, that the block fits a slot and that the
    /// zone has room for a whole slot, then advances the receive address
    /// by one slot. Every cycle programs `N` bytes, so a short block
    /// still uses up a full slot of the zone.
    pub fn reserve(&mut self, len: usize) -> Result<(), DfuError> {
        if self.buf.is_full() {
            return Err(DfuError::BuffersFull);
        }
        if len > N {
            return Err(DfuError::TransferTooLarge);
        }
        let slot_end = u32::try_from(N)
            .ok()
            .and_then(|n| self.cursor.recv.checked_add(n));
        match slot_end {
            Some(recv) if recv <= self.cursor.end => {
                self.cursor.recv = recv;
                Ok(())
            }
            _ => Err(DfuError::ZoneOverflow),
        }
    }

    /// Slot for a download reserved with [`reserve()`](Pipeline::reserve).
    pub fn writable(&mut self, len: usize) -> &mut [u8] {
        self.buf.writable(min(len, N))
    }

    /// Queues the slot returned by [`writable()`](Pipeline::writable).
    pub fn commit(&mut self) {
        self.buf.commit();
    }

    /// Both slots as scratch memory.
    pub fn scratch(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    /// Both slots as writable scratch memory. Queued data is overwritten.
    pub fn scratch_mut(&mut self) -> &mut [u8] {
        self.buf.as_bytes_mut()
    }

    /// Advances the erase/program work by at most one flash command.
    ///
    /// Returns immediately when there is nothing to do or the chip is
    /// busy. Must be called often, the pipeline only moves on when called.
    pub fn tick<M: DfuFlash>(&mut self, mem: &mut M) {
        if self.cursor.op == FlashOp::Idle && self.buf.is_empty() {
            return;
        }

        if mem.read_status() & STATUS_BUSY != 0 {
            return;
        }

        let c = &mut self.cursor;

        if c.op == FlashOp::Idle {
            c.op = FlashOp::Erasing;
            c.op_len = N as u32;
            c.op_ofs = 0;
            trace!("dfu: write {=u32:#x}, {=u32} bytes", c.prog, c.op_len);
        }

        if c.op == FlashOp::Erasing {
            if c.erase >= c.prog.saturating_add(c.op_len) {
                c.op = FlashOp::Programming;
            } else {
                trace!("dfu: erase {=u32:#x}", c.erase);
                mem.write_enable();
                mem.erase_block(c.erase);
                c.erase = c.erase.saturating_add(M::ERASE_BLOCK_SIZE);
                return;
            }
        }

        if c.op == FlashOp::Programming {
            if c.op_ofs == c.op_len {
                c.prog = c.prog.saturating_add(c.op_len);
                c.op = FlashOp::Idle;
                self.buf.release();
                trace!("dfu: slot done, {=usize} queued", self.buf.used());
            } else {
                let address = c.prog + c.op_ofs;
                let page_room = M::PAGE_SIZE - address % M::PAGE_SIZE;
                let len = min(c.op_len - c.op_ofs, page_room);
                let from = c.op_ofs as usize;

                mem.write_enable();
                mem.quad_page_program(&self.buf.readable()[from..from + len as usize], address);
                c.op_ofs += len;
            }
        }

        debug_assert!(self.cursor.erase >= self.cursor.prog);
    }
}

impl<const N: usize> Default for Pipeline<N> {
    fn default() -> Self {
        Self::new()
    }
}
