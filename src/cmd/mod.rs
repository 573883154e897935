mod check_url;
mod overlay;
mod run;

pub use check_url::cmd_check_url;
pub use overlay::cmd_overlay;
pub use run::cmd_run;
