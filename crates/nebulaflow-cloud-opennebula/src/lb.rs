//! Load balancer wiring
//!
//! The router VMs run HAProxy configured through context variables. The
//! router side declares one frontend per listener port (`ONEAPP_VNF_HAPROXY_LB<i>_*`)
//! and each backend VM registers itself through its user template
//! (`ONEGATE_HAPROXY_LB<i>_*`). Both sides index ports by their position in
//! ascending order, so the same port always lands on the same index.

use crate::config::DEFAULT_CONTROL_PLANE_PORT;
use nebulaflow_cloud::Document;

/// Placeholder the router resolves to its first endpoint address
const ENDPOINT_PLACEHOLDER: &str = "<ETH0_EP0>";

/// Key the backend registration is detected by
pub const FIRST_BACKEND_HOST: &str = "ONEGATE_HAPROXY_LB0_SERVER_HOST";

fn sorted_ports(listener_ports: &[u16]) -> Vec<u16> {
    if listener_ports.is_empty() {
        return vec![DEFAULT_CONTROL_PLANE_PORT];
    }
    let mut ports = listener_ports.to_vec();
    ports.sort_unstable();
    ports
}

/// User template update that registers `server_address` as a backend for
/// every listener port
pub fn backend_params(listener_ports: &[u16], server_address: &str) -> Document {
    let mut update = Document::new();
    for (index, port) in sorted_ports(listener_ports).into_iter().enumerate() {
        update.add_pair(format!("ONEGATE_HAPROXY_LB{}_IP", index), ENDPOINT_PLACEHOLDER);
        update.add_pair(format!("ONEGATE_HAPROXY_LB{}_PORT", index), port.to_string());
        update.add_pair(format!("ONEGATE_HAPROXY_LB{}_SERVER_HOST", index), server_address);
        update.add_pair(format!("ONEGATE_HAPROXY_LB{}_SERVER_PORT", index), port.to_string());
    }
    update
}

/// Context variables enabling HAProxy on the router with one frontend per
/// listener port
pub fn frontend_context(listener_ports: &[u16]) -> Vec<(String, String)> {
    let mut context = vec![
        ("ONEAPP_VNF_HAPROXY_ENABLED".to_string(), "YES".to_string()),
        ("ONEAPP_VNF_HAPROXY_ONEGATE_ENABLED".to_string(), "YES".to_string()),
    ];
    for (index, port) in sorted_ports(listener_ports).into_iter().enumerate() {
        context.push((
            format!("ONEAPP_VNF_HAPROXY_LB{}_IP", index),
            ENDPOINT_PLACEHOLDER.to_string(),
        ));
        context.push((format!("ONEAPP_VNF_HAPROXY_LB{}_PORT", index), port.to_string()));
    }
    context
}
