mod parser;
mod path;
pub mod types;

pub use parser::{ParseError, parse_schema};
pub use path::{OperationPath, find_operation};
