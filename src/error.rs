// src/error.rs
//
// Unified error handling for plum-raster
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input, recoverable
// - CodecError: Container format issues
// - ResourceLimit: Memory/size/file-system limits
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy for callers that only care about the broad class of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    UserError,
    /// Format/encoding issues
    CodecError,
    /// Memory/size/file-system limits
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

/// Numeric error codes, stable across versions.
///
/// Scripting front-ends receive these instead of the rich error value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    Ok = 0,
    InvalidArguments = 1,
    InvalidFileFormat = 2,
    InvalidColorIndex = 3,
    TooManyColors = 4,
    UndefinedPalette = 5,
    ImageTooLarge = 6,
    NoData = 7,
    NoMultiFrame = 8,
    FileInaccessible = 9,
    FileError = 10,
    OutOfMemory = 11,
}

/// Number of defined error codes, `Ok` included.
pub const NUM_ERRORS: u32 = 12;

impl ErrorCode {
    pub const ALL: [ErrorCode; NUM_ERRORS as usize] = [
        ErrorCode::Ok,
        ErrorCode::InvalidArguments,
        ErrorCode::InvalidFileFormat,
        ErrorCode::InvalidColorIndex,
        ErrorCode::TooManyColors,
        ErrorCode::UndefinedPalette,
        ErrorCode::ImageTooLarge,
        ErrorCode::NoData,
        ErrorCode::NoMultiFrame,
        ErrorCode::FileInaccessible,
        ErrorCode::FileError,
        ErrorCode::OutOfMemory,
    ];

    pub fn from_u32(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn text(self) -> &'static str {
        match self {
            ErrorCode::Ok => "success",
            ErrorCode::InvalidArguments => "invalid argument for function",
            ErrorCode::InvalidFileFormat => "invalid image data or unknown format",
            ErrorCode::InvalidColorIndex => "invalid palette index",
            ErrorCode::TooManyColors => "too many colors in image",
            ErrorCode::UndefinedPalette => "image palette not defined",
            ErrorCode::ImageTooLarge => "image dimensions too large",
            ErrorCode::NoData => "image contains no image data",
            ErrorCode::NoMultiFrame => "multiple frames not supported",
            ErrorCode::FileInaccessible => "could not access file",
            ErrorCode::FileError => "file input/output error",
            ErrorCode::OutOfMemory => "out of memory",
        }
    }
}

/// Text for a numeric error code; `None` for codes outside the table.
pub fn error_text(code: u32) -> Option<&'static str> {
    ErrorCode::from_u32(code).map(ErrorCode::text)
}

/// plum-raster error types
#[derive(Debug, Error)]
pub enum PlumError {
    // Argument Errors
    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("Palette index {index} is not defined (palette has {palette_len} entries)")]
    InvalidColorIndex { index: usize, palette_len: usize },

    #[error("Image needs {colors} distinct colors, palettes hold at most 256")]
    TooManyColors { colors: usize },

    #[error("Image has no palette")]
    UndefinedPalette,

    // Size Errors
    #[error("Image size {width}x{height}x{frames} is too large")]
    ImageTooLarge { width: u32, height: u32, frames: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    #[error("Input size {bytes} bytes exceeds maximum {max}")]
    InputTooLarge { bytes: u64, max: u64 },

    #[error("Out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    // Codec Errors
    #[error("Invalid image data: {message}")]
    InvalidFileFormat { message: Cow<'static, str> },

    #[error("Image contains no data")]
    NoData,

    #[error("{format} cannot store {frames} frames")]
    NoMultiFrame {
        format: Cow<'static, str>,
        frames: u32,
    },

    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // File I/O Errors
    #[error("File not found: {path}")]
    FileNotFound { path: Cow<'static, str> },

    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to memory-map file '{path}': {source}")]
    MmapFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

fn clone_io(source: &std::io::Error) -> std::io::Error {
    std::io::Error::new(source.kind(), source.to_string())
}

impl Clone for PlumError {
    fn clone(&self) -> Self {
        match self {
            Self::InvalidArgument {
                name,
                value,
                reason,
            } => Self::InvalidArgument {
                name: name.clone(),
                value: value.clone(),
                reason: reason.clone(),
            },
            Self::InvalidColorIndex { index, palette_len } => Self::InvalidColorIndex {
                index: *index,
                palette_len: *palette_len,
            },
            Self::TooManyColors { colors } => Self::TooManyColors { colors: *colors },
            Self::UndefinedPalette => Self::UndefinedPalette,
            Self::ImageTooLarge {
                width,
                height,
                frames,
            } => Self::ImageTooLarge {
                width: *width,
                height: *height,
                frames: *frames,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::InputTooLarge { bytes, max } => Self::InputTooLarge {
                bytes: *bytes,
                max: *max,
            },
            Self::OutOfMemory { bytes } => Self::OutOfMemory { bytes: *bytes },
            Self::InvalidFileFormat { message } => Self::InvalidFileFormat {
                message: message.clone(),
            },
            Self::NoData => Self::NoData,
            Self::NoMultiFrame { format, frames } => Self::NoMultiFrame {
                format: format.clone(),
                frames: *frames,
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::FileNotFound { path } => Self::FileNotFound { path: path.clone() },
            Self::FileReadFailed { path, source } => Self::FileReadFailed {
                path: path.clone(),
                source: clone_io(source),
            },
            Self::MmapFailed { path, source } => Self::MmapFailed {
                path: path.clone(),
                source: clone_io(source),
            },
            Self::FileWriteFailed { path, source } => Self::FileWriteFailed {
                path: path.clone(),
                source: clone_io(source),
            },
            Self::InternalPanic { message } => Self::InternalPanic {
                message: message.clone(),
            },
        }
    }
}

// Constructor Helpers
impl PlumError {
    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_color_index(index: usize, palette_len: usize) -> Self {
        Self::InvalidColorIndex { index, palette_len }
    }

    pub fn too_many_colors(colors: usize) -> Self {
        Self::TooManyColors { colors }
    }

    pub fn undefined_palette() -> Self {
        Self::UndefinedPalette
    }

    pub fn image_too_large(width: u32, height: u32, frames: u32) -> Self {
        Self::ImageTooLarge {
            width,
            height,
            frames,
        }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn input_too_large(bytes: u64, max: u64) -> Self {
        Self::InputTooLarge { bytes, max }
    }

    pub fn out_of_memory(bytes: usize) -> Self {
        Self::OutOfMemory { bytes }
    }

    pub fn invalid_file_format(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidFileFormat {
            message: message.into(),
        }
    }

    pub fn no_data() -> Self {
        Self::NoData
    }

    pub fn no_multi_frame(format: impl Into<Cow<'static, str>>, frames: u32) -> Self {
        Self::NoMultiFrame {
            format: format.into(),
            frames,
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn file_not_found(path: impl Into<Cow<'static, str>>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn mmap_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::MmapFailed {
            path: path.into(),
            source,
        }
    }

    pub fn file_write_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (user can fix it)
    ///
    /// Consistent with category(): UserError and ResourceLimit are recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument { .. }
            | Self::InvalidColorIndex { .. }
            | Self::TooManyColors { .. }
            | Self::UndefinedPalette
            | Self::FileNotFound { .. } => ErrorCategory::UserError,

            Self::InvalidFileFormat { .. }
            | Self::NoData
            | Self::NoMultiFrame { .. }
            | Self::EncodeFailed { .. } => ErrorCategory::CodecError,

            Self::ImageTooLarge { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::InputTooLarge { .. }
            | Self::OutOfMemory { .. }
            | Self::FileReadFailed { .. }
            | Self::MmapFailed { .. }
            | Self::FileWriteFailed { .. } => ErrorCategory::ResourceLimit,

            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }

    /// Numeric code for script-facing callers.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument { .. } | Self::InternalPanic { .. } => {
                ErrorCode::InvalidArguments
            }
            Self::InvalidColorIndex { .. } => ErrorCode::InvalidColorIndex,
            Self::TooManyColors { .. } => ErrorCode::TooManyColors,
            Self::UndefinedPalette => ErrorCode::UndefinedPalette,
            Self::ImageTooLarge { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::InputTooLarge { .. } => ErrorCode::ImageTooLarge,
            Self::OutOfMemory { .. } => ErrorCode::OutOfMemory,
            Self::InvalidFileFormat { .. } | Self::EncodeFailed { .. } => {
                ErrorCode::InvalidFileFormat
            }
            Self::NoData => ErrorCode::NoData,
            Self::NoMultiFrame { .. } => ErrorCode::NoMultiFrame,
            Self::FileNotFound { .. } | Self::MmapFailed { .. } => ErrorCode::FileInaccessible,
            Self::FileReadFailed { .. } | Self::FileWriteFailed { .. } => ErrorCode::FileError,
        }
    }
}

impl ErrorCategory {
    /// Get string representation of error category
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, PlumError>;
