//! Structured data recovered from console output.
//!
//! These operations are built from plain [`Session::send`](crate::Session::send)
//! calls: scalar queries through a sentinel parameter, column listings through
//! output redirection, and plot images through the JPEG device.

mod plot;
mod table;
mod value;

pub use table::{
    DEFAULT_RUN_LENGTH, ListOptions, OUTPUT_FILE, Table, calculate_skip_rows, detect_skip_rows,
};
pub use value::{GetQuery, SENTINEL, ScalarValue};
