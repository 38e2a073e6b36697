pub mod roster;
pub mod verification;
