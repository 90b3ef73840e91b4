pub mod logging;
pub mod paper;
pub mod settings;
