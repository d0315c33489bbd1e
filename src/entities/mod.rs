pub mod director;
pub mod movie;
pub mod review;
pub mod token;
pub mod user;
