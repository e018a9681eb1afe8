pub mod input;
pub mod metaimage;
pub mod output;

pub use input::CenterlineData;
pub use metaimage::{read_frame, read_frames};
pub use output::write_flow_field;
