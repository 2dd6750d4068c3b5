pub mod binarization;
pub mod clipping;
pub mod simplification;
pub mod thinning;
pub mod vectorization;

pub use binarization::*;
pub use clipping::*;
pub use simplification::*;
pub use thinning::*;
pub use vectorization::*;
