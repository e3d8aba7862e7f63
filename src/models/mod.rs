pub mod analysis;
pub mod message;
pub mod pet;
pub mod response;
