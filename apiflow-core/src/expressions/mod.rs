mod path;

pub use path::extract_value;
