mod error;
mod pointer;
mod relay_message;
mod stroke;
mod stroke_log;
mod sync_message;

pub use error::*;
pub use pointer::*;
pub use relay_message::*;
pub use stroke::*;
pub use stroke_log::*;
pub use sync_message::*;

pub extern crate serde;
pub extern crate serde_json;
pub extern crate uuid;
