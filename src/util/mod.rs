pub mod atomic;

pub use atomic::{append_json_line, write_json_atomic, write_json_lines_atomic};
