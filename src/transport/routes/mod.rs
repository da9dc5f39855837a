pub mod guild;
pub mod sessions;
