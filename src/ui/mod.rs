pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{dim, header, info, section, success, warn};
pub use table::TableBuilder;
pub use theme::{theme, Theme};
