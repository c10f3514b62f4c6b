//! Raw square elevation grids.
//!
//! A heightmap file is a flat, row-major stream of `N * N` bytes,
//! one quantized elevation sample (0..=255) per cell, with no
//! header. The grid width is inferred from the stream length.
//!
//! Cell `(x, y)` lives at byte `x + y * N`.

mod error;

pub use crate::error::HeightmapError;
use byteorder::{ByteOrder, LittleEndian as LE};
use memmap2::Mmap;
use std::{
    fs::File,
    io::{BufReader, Read},
    mem::size_of,
    path::Path,
    sync::atomic::{AtomicU16, Ordering},
};

/// Sentinel for a not yet computed min/max. Samples are `u8`, so it
/// can never collide with a real value.
const UNKNOWN: u16 = u16::MAX;

pub struct Heightmap {
    /// Number of cells along each side.
    width: usize,

    /// Lowest elevation sample in this grid.
    min_elevation: AtomicU16,

    /// Highest elevation sample in this grid.
    max_elevation: AtomicU16,

    /// Elevation samples.
    samples: SampleStore,
}

enum SampleStore {
    InMem(Box<[u8]>),
    MemMap(Mmap),
}

impl SampleStore {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::InMem(samples) => samples,
            Self::MemMap(raw) => raw.as_ref(),
        }
    }
}

impl Heightmap {
    /// Returns a Heightmap built from an in-memory byte stream.
    pub fn from_bytes(samples: Vec<u8>) -> Result<Self, HeightmapError> {
        let width = square_width(samples.len() as u64)
            .ok_or(HeightmapError::NotSquare(samples.len() as u64))?;
        Ok(Self::with_store(
            width,
            SampleStore::InMem(samples.into_boxed_slice()),
        ))
    }

    /// Returns a Heightmap read into memory from the file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, HeightmapError> {
        let width = extract_width(&path)?;
        let mut file = BufReader::new(File::open(path)?);
        let mut samples = vec![0; width * width];
        file.read_exact(&mut samples)?;
        Ok(Self::with_store(
            width,
            SampleStore::InMem(samples.into_boxed_slice()),
        ))
    }

    /// Returns a Heightmap using the memory-mapped file as storage.
    pub fn memmap<P: AsRef<Path>>(path: P) -> Result<Self, HeightmapError> {
        let width = extract_width(&path)?;
        let samples = {
            let file = File::open(path)?;
            let mmap = unsafe { Mmap::map(&file)? };
            SampleStore::MemMap(mmap)
        };
        Ok(Self::with_store(width, samples))
    }

    /// Returns a `width` x `width` grid where every cell is `elevation`.
    pub fn flat(width: usize, elevation: u8) -> Self {
        Self::with_store(
            width,
            SampleStore::InMem(vec![elevation; width * width].into_boxed_slice()),
        )
    }

    /// Returns a `width` x `width` grid with each cell set by `f(x, y)`.
    pub fn from_fn<F>(width: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> u8,
    {
        let mut samples = Vec::with_capacity(width * width);
        for y in 0..width {
            for x in 0..width {
                samples.push(f(x, y));
            }
        }
        Self::with_store(width, SampleStore::InMem(samples.into_boxed_slice()))
    }

    /// Returns `self` if its width is `expected`.
    pub fn expect_width(self, expected: usize) -> Result<Self, HeightmapError> {
        if self.width == expected {
            Ok(self)
        } else {
            Err(HeightmapError::Width {
                actual: self.width,
                expected,
            })
        }
    }

    /// Returns the number of cells along one side of the grid.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the number of samples in this grid.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.width * self.width
    }

    /// Returns the sample at cell `(x, y)`, or `None` outside the grid.
    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        if x < self.width && y < self.width {
            Some(self.get_unchecked(x, y))
        } else {
            None
        }
    }

    /// Returns the sample at cell `(x, y)`.
    ///
    /// Panics if the cell lies outside the grid.
    pub fn get_unchecked(&self, x: usize, y: usize) -> u8 {
        self.samples.as_slice()[x + y * self.width]
    }

    /// Returns the raw row-major samples.
    pub fn samples(&self) -> &[u8] {
        self.samples.as_slice()
    }

    /// Returns the lowest elevation sample in this grid.
    pub fn min_elevation(&self) -> u8 {
        cached(&self.min_elevation, || {
            self.samples().iter().min().copied().unwrap_or_default()
        })
    }

    /// Returns the highest elevation sample in this grid.
    pub fn max_elevation(&self) -> u8 {
        cached(&self.max_elevation, || {
            self.samples().iter().max().copied().unwrap_or_default()
        })
    }

    /// Returns the samples widened to little-endian `u32` words.
    ///
    /// Storage buffers have no byte-granular element type, so each
    /// sample occupies a full word on the device. Values are not
    /// scaled.
    pub fn to_device_words(&self) -> Vec<u8> {
        let wide: Vec<u32> = self.samples().iter().map(|&s| u32::from(s)).collect();
        let mut words = vec![0; wide.len() * size_of::<u32>()];
        LE::write_u32_into(&wide, &mut words);
        words
    }
}

/// Private API
impl Heightmap {
    fn with_store(width: usize, samples: SampleStore) -> Self {
        Self {
            width,
            min_elevation: UNKNOWN.into(),
            max_elevation: UNKNOWN.into(),
            samples,
        }
    }
}

fn cached<F: FnOnce() -> u8>(slot: &AtomicU16, compute: F) -> u8 {
    match slot.load(Ordering::Relaxed) {
        UNKNOWN => {
            let value = compute();
            slot.store(u16::from(value), Ordering::SeqCst);
            value
        }
        #[allow(clippy::cast_possible_truncation)]
        value => value as u8,
    }
}

/// Returns the side length of a square grid holding `len` samples.
pub fn square_width(len: u64) -> Option<usize> {
    if len == 0 {
        return None;
    }
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let guess = (len as f64).sqrt().round() as u64;
    // Guard against float rounding on very large inputs.
    (guess.saturating_sub(1)..=guess + 1)
        .find(|w| w.checked_mul(*w) == Some(len))
        .and_then(|w| usize::try_from(w).ok())
}

fn extract_width<P: AsRef<Path>>(path: P) -> Result<usize, HeightmapError> {
    let len = path.as_ref().metadata()?.len();
    square_width(len).ok_or_else(|| HeightmapError::FileLen(len, path.as_ref().to_owned()))
}
