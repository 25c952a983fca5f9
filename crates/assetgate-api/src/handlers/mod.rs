pub mod definitions;
pub mod health;
pub mod multipart;
pub mod objects;
pub mod uploads;
