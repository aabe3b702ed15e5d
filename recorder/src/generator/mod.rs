pub mod profile;
pub mod template;
