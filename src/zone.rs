/// A region of flash that one alternate setting writes to.
///
/// `start` must sit on an erase-block boundary and the length must be a
/// multiple of both the erase block and the transfer size. The pipeline
/// erases whole blocks and programs whole buffer slots, so a zone that
/// breaks these rules gets its neighbour erased or padded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Zone {
    /// Interface string of the alternate setting.
    pub name: &'static str,
    /// First address of the zone.
    pub start: u32,
    /// First address past the zone.
    pub end: u32,
}

impl Zone {
    /// Creates a zone covering `start..end`.
    pub const fn new(name: &'static str, start: u32, end: u32) -> Self {
        Self { name, start, end }
    }

    /// Size of the zone in bytes.
    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` if the zone can not hold any data.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks whether `start` and `end` meet `align`, see [`Zone`].
    pub const fn is_aligned(&self, align: u32) -> bool {
        align != 0 && self.start % align == 0 && self.end % align == 0
    }
}

/// Zone layout of the badge's 4 MiB configuration flash.
pub const BADGE_ZONES: [Zone; 2] = [
    Zone::new("ECP5 bitstream", 0x0018_0000, 0x0030_0000),
    Zone::new("RISC-V firmware", 0x0030_0000, 0x0038_0000),
];

/// Errors from selecting an alternate setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ZoneError {
    /// No zone is defined for this alternate setting.
    OutOfRange(u8),
}

/// Looks up the zone of alternate setting `alt`.
pub fn lookup(zones: &[Zone], alt: u8) -> Result<Zone, ZoneError> {
    zones
        .get(alt as usize)
        .copied()
        .ok_or(ZoneError::OutOfRange(alt))
}
