pub mod payments;
pub mod rental;
pub mod verification;
