pub mod envelope;
pub mod image;
pub mod result;

pub use envelope::*;
pub use image::*;
pub use result::*;
