use arrayvec::ArrayVec;

use crate::err::FieldError;

/// Maximum number of annotated errors a [`Validator`] retains. Further
/// errors are counted but their details are dropped.
pub const VALIDATOR_CAPACITY: usize = 8;

/// A validation error annotated with the bit position of the offending
/// field, counted from the start of the validated buffer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnnotatedError {
    pub error: FieldError,
    /// Bit offset of the field that failed validation.
    pub bit_offset: usize,
}

impl core::fmt::Display for AnnotatedError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} (at bit {})", self.error, self.bit_offset)
    }
}

/// Accumulates validation errors across the validation calls of one or
/// more frame views over the same carrier.
///
/// Validation methods push into the validator instead of returning on the
/// first problem, so a single pass reports every broken field. The caller
/// drains the accumulated errors between pipeline stages via
/// [`Validator::take`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Validator {
    entries: ArrayVec<AnnotatedError, VALIDATOR_CAPACITY>,
    /// Errors pushed after the capacity was reached.
    dropped: usize,
}

impl Validator {
    pub fn new() -> Validator {
        Validator {
            entries: ArrayVec::new(),
            dropped: 0,
        }
    }

    /// Records an error together with the bit offset of the field that
    /// triggered it.
    pub fn push(&mut self, error: FieldError, bit_offset: usize) {
        if self
            .entries
            .try_push(AnnotatedError { error, bit_offset })
            .is_err()
        {
            self.dropped += 1;
        }
    }

    /// True if no error was recorded since construction or the last
    /// [`Validator::take`].
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.entries.is_empty() && self.dropped == 0
    }

    /// Number of recorded errors, including dropped ones.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len() + self.dropped
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the retained errors.
    pub fn iter(&self) -> impl Iterator<Item = &AnnotatedError> {
        self.entries.iter()
    }

    /// Drains the accumulated errors, resetting the validator for the
    /// next stage.
    pub fn take(&mut self) -> ArrayVec<AnnotatedError, VALIDATOR_CAPACITY> {
        self.dropped = 0;
        core::mem::take(&mut self.entries)
    }

    /// Returns `Ok(())` if no errors were recorded, otherwise the first
    /// recorded error (the retained annotations stay available through
    /// [`Validator::iter`]).
    pub fn result(&self) -> Result<(), AnnotatedError> {
        match self.entries.first() {
            None => Ok(()),
            Some(first) => Err(first.clone()),
        }
    }
}
