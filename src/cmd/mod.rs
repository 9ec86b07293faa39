pub(crate) mod check;
pub(crate) mod check_permission;
pub(crate) mod show;
