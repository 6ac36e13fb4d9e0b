//! Soft AP provisioning portal and REST settings endpoint.
//!
//! Two exclusive modes: the portal page on the device's own access point, or
//! `/settings` once joined to an existing network.

mod handlers;
mod html;
mod redirect;
mod server;

pub use html::{install_default_page, INDEX_HTML};
pub use redirect::{decide, handle_not_found, is_ip, PortalDecision};
pub use server::{ConfigManager, Mode, AP_GATEWAY};
