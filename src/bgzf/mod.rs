pub mod constants;
pub mod offset;
pub mod reader;
pub mod writer;

pub use constants::*;
pub use offset::VirtualFileOffset;
pub use reader::BgzfReader;
pub use writer::BgzfWriter;
