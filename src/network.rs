//! Local interface lookup for the device address shown in telemetry.

use std::net::IpAddr;

use pnet::datalink::{self, NetworkInterface};

/// Find a network interface by name, or the first usable one.
///
/// Without a name, picks the first interface that is up, not loopback and
/// has at least one address.
pub fn find_interface(name: Option<&str>) -> Option<NetworkInterface> {
    let interfaces = datalink::interfaces();
    match name {
        Some(name) => interfaces.into_iter().find(|iface| iface.name == name),
        None => interfaces
            .into_iter()
            .find(|iface| iface.is_up() && !iface.is_loopback() && !iface.ips.is_empty()),
    }
}

/// First IPv4 address of `interface`, falling back to any address.
pub fn interface_address(interface: &NetworkInterface) -> Option<IpAddr> {
    let ips = || interface.ips.iter().map(|network| network.ip());
    ips().find(IpAddr::is_ipv4).or_else(|| ips().next())
}

/// Current address of the named (or first usable) interface.
pub fn device_address(name: Option<&str>) -> Option<IpAddr> {
    find_interface(name).as_ref().and_then(interface_address)
}
