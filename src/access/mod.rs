//! Path-based access control: masks, locations, and the rule table.

pub mod location;
pub mod mask;

pub use location::limit;
pub use location::{
    AuthLevel, AuthType, Encryption, HttpState, Location, LocationError, LocationTable, Order,
    Satisfy,
};
pub use mask::AuthMask;
