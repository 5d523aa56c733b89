//! Memcached ASCII protocol: inbound parsing, replies, and client-side requests

pub mod command;
pub mod exptime;
pub mod parser;
pub mod request;
pub mod response;

pub use command::{Command, MAX_ITEM_SIZE, MAX_KEY_LENGTH, check_key, is_valid_key};
pub use exptime::{exptime_from_ttl, ttl_from_exptime};
pub use parser::{ParseResult, find_crlf, parse};
pub use response::ResponseWriter;
