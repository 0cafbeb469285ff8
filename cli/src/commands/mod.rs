mod dashboard;
mod helpers;
mod photo;
mod profile;
mod weight;

pub(crate) use dashboard::cmd_dashboard;
pub(crate) use helpers::json_error;
pub(crate) use photo::{cmd_photo_dir, cmd_photo_export};
pub(crate) use profile::{cmd_profile_set, cmd_profile_show};
pub(crate) use weight::{cmd_weight_delete, cmd_weight_history, cmd_weight_log, cmd_weight_show};
