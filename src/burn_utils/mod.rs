pub mod avoid_overflow;
pub mod distribution;
pub mod rand;
pub mod sequence;
pub use avoid_overflow::*;
pub use self::rand::*;
pub use sequence::*;
