pub mod file_format;
pub mod float_ext;
pub mod log_setup;

pub use file_format::{deserialize, load_from_file, FileFormat, FormatError, FormatResult};
pub use float_ext::FloatExt;

/// Absolute tolerance of [`FloatExt::approximately_eq`].
pub const EPSILON: f64 = 1e-6;
