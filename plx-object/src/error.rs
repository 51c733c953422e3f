use plx_hal::HalError;

/// The type returned by driver operations.
pub type PlxResult<T = ()> = Result<T, PlxError>;

/// PLX status codes.
///
/// The numbering follows the PLX SDK, which starts its status space at
/// 0x200 so that values can never be mistaken for OS error codes.
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
#[repr(i32)]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PlxError {
    /// Success.
    OK = 0x200,

    /// The operation failed for an unspecified reason, or the object it
    /// refers to does not exist.
    FAILED = 0x201,

    /// A required parameter was missing.
    NULL_PARAM = 0x202,

    /// The operation is not implemented for this chip.
    UNSUPPORTED = 0x203,

    /// No driver is attached.
    NO_DRIVER = 0x204,

    /// The device could not be identified, or its state is inconsistent.
    INVALID_OBJECT = 0x205,

    /// Interface version mismatch.
    VER_MISMATCH = 0x206,

    /// A register offset is unaligned.
    INVALID_OFFSET = 0x207,

    /// An argument has an invalid value.
    INVALID_DATA = 0x208,

    /// A size is zero or out of range.
    INVALID_SIZE = 0x209,

    /// An offset lies outside the addressed space, or a BAR index is bad.
    INVALID_ADDR = 0x20A,

    /// Invalid channel index, channel not opened, or channel disabled in
    /// hardware.
    INVALID_ACCESS = 0x20B,

    /// Memory or another resource could not be obtained.
    INSUFFICIENT_RES = 0x20C,

    /// A bounded hardware poll, or a wait, ran out of time.
    TIMEOUT = 0x20D,

    /// A wait was interrupted or its object was canceled.
    CANCELED = 0x20E,

    /// The DMA channel is idle.
    COMPLETE = 0x20F,

    /// The DMA channel is paused.
    PAUSED = 0x210,

    /// A transfer is still active.
    IN_PROGRESS = 0x211,

    /// The page list for a user buffer could not be created.
    PAGE_GET_ERROR = 0x212,

    /// The pages of a user buffer could not be locked.
    PAGE_LOCK_ERROR = 0x213,

    /// The device is in a low power state.
    LOW_POWER = 0x214,

    /// The resource belongs to another owner.
    IN_USE = 0x215,

    /// The feature is disabled.
    DISABLED = 0x216,

    /// The request is pending.
    PENDING = 0x217,

    /// The object was not found.
    NOT_FOUND = 0x218,

    /// The device lifecycle state does not allow the operation.
    INVALID_STATE = 0x219,

    /// A caller buffer is too small.
    BUFF_TOO_SMALL = 0x21A,
}

impl From<HalError> for PlxError {
    fn from(e: HalError) -> Self {
        match e {
            HalError::NoMemory => PlxError::INSUFFICIENT_RES,
            HalError::PageLock => PlxError::PAGE_LOCK_ERROR,
            HalError::InvalidParam => PlxError::INVALID_DATA,
        }
    }
}

impl From<PlxResult> for PlxError {
    fn from(r: PlxResult) -> Self {
        r.err().unwrap_or(PlxError::OK)
    }
}
