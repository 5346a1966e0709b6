pub use paste::paste;

macro_rules! module_facade {
    ($name:ident) => {
        $crate::paste!{
            pub mod $name {
                pub use [<lumen_ $name>]::*;
            }
        }
    };
}

module_facade!(core);
module_facade!(cfg);
module_facade!(shader);

/// Bring up the ambient services shared by every Lumen tool.
pub fn initialize(level: log::LevelFilter) -> Result<(), anyhow::Error> {
    lumen_core::log::initialize(level)?;
    Ok(())
}
