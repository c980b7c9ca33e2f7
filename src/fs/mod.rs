pub mod atomic;
pub mod layout;

pub use atomic::{fsync_parent_dir, open_dir_nofollow, remove_if_exists, write_atomic};
pub use layout::{check_site_id, is_valid_site_id, SiteLayout};
