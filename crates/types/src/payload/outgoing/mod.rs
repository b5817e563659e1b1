mod identify;
mod resume;

pub use self::identify::{ConnectionProperties, Identify};
pub use self::resume::Resume;
