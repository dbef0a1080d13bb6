//! OpenNebula template keys used by the engine

pub const NAME: &str = "NAME";
pub const CLUSTER_UID: &str = "CLUSTER_UID";

// NIC
pub const NETWORK: &str = "NETWORK";
pub const GATEWAY: &str = "GATEWAY";
pub const DNS: &str = "DNS";
pub const IP: &str = "IP";
pub const FLOATING_IP: &str = "FLOATING_IP";
pub const FLOATING_ONLY: &str = "FLOATING_ONLY";
pub const VROUTER_IP: &str = "VROUTER_IP";

// CONTEXT
pub const ETH0_IP: &str = "ETH0_IP";
pub const BACKEND: &str = "BACKEND";
pub const USER_DATA: &str = "USER_DATA";
pub const USER_DATA_ENCODING: &str = "USER_DATA_ENCODING";

pub const YES: &str = "YES";
pub const NO: &str = "NO";
