pub mod assessments;
pub mod health;
pub mod taxpayers;

pub use assessments::*;
pub use health::*;
pub use taxpayers::*;
