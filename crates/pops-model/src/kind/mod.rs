mod family;
pub use family::TaskFamily;
