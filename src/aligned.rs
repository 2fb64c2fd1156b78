//! Padded, 32-byte aligned staging buffer for encoder input.
//!
//! SIMD paths in libswscale and some encoders read past the end of a row and
//! assume 32-byte aligned rows. Caller memory offers neither guarantee, so the
//! writer copies frames that fail the check into an [`AlignedBuffer`] first.

/// Row alignment and tail padding, in bytes.
pub const ALIGNMENT: usize = 32;

const PAGE_SIZE: usize = 4096;

#[derive(Clone, Copy)]
#[repr(C, align(32))]
struct Block([u8; ALIGNMENT]);

const ZERO_BLOCK: Block = Block([0; ALIGNMENT]);

/// Round `value` up to the next multiple of [`ALIGNMENT`].
pub fn align_up(value: usize) -> usize {
    value.div_ceil(ALIGNMENT) * ALIGNMENT
}

/// Whether a frame must be copied before it can be handed to FFmpeg.
///
/// A copy is needed when rows are not 32-byte multiples, or when the 32 bytes
/// around the end of the data straddle a page boundary (an over-read there
/// could touch an unmapped page).
pub fn needs_copy(data: &[u8], step: usize, height: usize) -> bool {
    if step % ALIGNMENT != 0 {
        return true;
    }
    let Some(end) = step
        .checked_mul(height)
        .and_then(|length| (data.as_ptr() as usize).checked_add(length))
    else {
        return true;
    };
    let before = end.wrapping_sub(ALIGNMENT) & !(PAGE_SIZE - 1);
    let after = end.wrapping_add(ALIGNMENT) & !(PAGE_SIZE - 1);
    before != after
}

/// Zero-initialised, 32-byte aligned byte storage that grows on demand.
#[derive(Default)]
pub struct AlignedBuffer {
    blocks: Vec<Block>,
    step: usize,
    height: usize,
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("capacity", &self.capacity())
            .field("step", &self.step)
            .field("height", &self.height)
            .finish()
    }
}

impl AlignedBuffer {
    /// An empty buffer; storage is allocated by the first [`fill`](Self::fill).
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocated bytes.
    pub fn capacity(&self) -> usize {
        self.blocks.len() * ALIGNMENT
    }

    /// Row stride of the last copied frame (a multiple of [`ALIGNMENT`]).
    pub fn step(&self) -> usize {
        self.step
    }

    /// Rows of the last copied frame.
    pub fn height(&self) -> usize {
        self.height
    }

    /// The last copied frame's rows, `step() * height()` bytes.
    pub fn frame(&self) -> &[u8] {
        &self.as_bytes()[..self.step * self.height]
    }

    /// The whole allocation, padding included.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `Block` is a plain byte array with no padding, so the vector
        // is a contiguous run of initialised bytes.
        unsafe { std::slice::from_raw_parts(self.blocks.as_ptr().cast::<u8>(), self.capacity()) }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.capacity();
        // SAFETY: as in `as_bytes`, with exclusive access through `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.blocks.as_mut_ptr().cast::<u8>(), len) }
    }

    /// Copy `height` rows of `row_bytes` bytes from `source` (stride
    /// `source_step`) into aligned rows, optionally reversing row order.
    ///
    /// The buffer grows to `align_up(source_step) * height + ALIGNMENT`
    /// bytes when smaller. Returns the aligned stride.
    pub fn fill(
        &mut self,
        source: &[u8],
        source_step: usize,
        row_bytes: usize,
        height: usize,
        flip: bool,
    ) -> usize {
        let step = align_up(source_step.max(row_bytes));
        let required = step * height + ALIGNMENT;
        if self.capacity() < required {
            self.blocks.resize(required.div_ceil(ALIGNMENT), ZERO_BLOCK);
        }
        self.step = step;
        self.height = height;

        let bytes = self.as_bytes_mut();
        for row in 0..height {
            let source_row = if flip { height - 1 - row } else { row };
            let start = source_row * source_step;
            let Some(src) = source.get(start..start + row_bytes) else {
                break;
            };
            bytes[row * step..row * step + row_bytes].copy_from_slice(src);
        }
        step
    }
}
