mod catalog;
mod detect;
mod diet;
mod export;
mod helpers;
mod import;

pub(crate) use catalog::cmd_catalog_load;
pub(crate) use detect::cmd_detect;
pub(crate) use diet::cmd_diet_list;
pub(crate) use export::{cmd_export_backup, cmd_export_diet};
pub(crate) use helpers::json_error;
pub(crate) use import::cmd_import;
