//! One fetcher per metadata class, all plugged into the generic
//! [`crate::sched::fetch::FetchClass`] lifecycle.

pub(crate) mod counts;
pub(crate) mod deep_count;
pub(crate) mod extension;
pub(crate) mod file_info;
pub(crate) mod filesystem_info;
pub(crate) mod link_info;
pub(crate) mod mime_list;
pub(crate) mod mount;
pub(crate) mod thumbnail;
pub(crate) mod top_left;
