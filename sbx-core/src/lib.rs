// sbx-core/src/lib.rs
pub mod extract;
pub mod install;

pub use install::base::Installer;
pub use install::AnyInstaller;
