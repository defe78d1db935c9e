//! Payload size guard
//!
//! Rejects oversized input before any decoding work is spent on it.

use crate::{
    error::{PipelineError, Result},
    types::RawImageBytes,
};

/// Byte-size gate in front of the decoder
#[derive(Debug, Clone, Copy)]
pub struct SizeGuard {
    max_bytes: u64,
    strict: bool,
}

impl SizeGuard {
    /// Create a guard that only trusts the transport's size hint
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            strict: false,
        }
    }

    /// Create a guard that also checks the measured byte length
    #[must_use]
    pub fn strict(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            strict: true,
        }
    }

    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Check a size against the threshold
    ///
    /// Exactly `max_bytes` passes; anything above fails.
    ///
    /// # Errors
    /// - `PayloadTooLarge` when `size` exceeds the threshold
    pub fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_bytes {
            return Err(PipelineError::payload_too_large(size, self.max_bytes));
        }
        Ok(())
    }

    /// Pass bytes through unchanged or reject them
    ///
    /// A missing size hint is not an error. In strict mode the measured length
    /// is checked as well, so unhinted input is still bounded.
    ///
    /// # Errors
    /// - `PayloadTooLarge` when the claimed or (strict) measured size exceeds the threshold
    pub fn check(&self, input: RawImageBytes) -> Result<RawImageBytes> {
        if let Some(claimed) = input.claimed_size() {
            self.check_size(claimed)?;
        }
        if self.strict {
            self.check_size(input.len() as u64)?;
        }
        Ok(input)
    }
}
