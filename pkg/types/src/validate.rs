use anyhow::{Result, bail};
use pkg_constants::cluster::MAX_NAME_LEN;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Validate a Service name (RFC 1035 label).
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, starts with a letter, ends alphanumeric.
pub fn validate_service_name(name: &str) -> Result<()> {
    validate_label(name)?;
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        bail!("name '{}' must start with a lowercase letter", name);
    }
    Ok(())
}

/// Validate a namespace name (RFC 1123 label).
/// Same as a Service name, except that a leading digit is allowed.
pub fn validate_namespace(name: &str) -> Result<()> {
    validate_label(name)
}

fn validate_label(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > MAX_NAME_LEN {
        bail!(
            "name '{}' exceeds {} characters (got {})",
            name,
            MAX_NAME_LEN,
            name.len()
        );
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

/// Parse the external address a swapped Service should point at.
///
/// Endpoints addresses must be IP literals, so hostnames are rejected here
/// rather than by the API server halfway through a swap. The same goes for
/// the ranges the API server refuses in an Endpoints subset: unspecified,
/// loopback, link-local and link-local multicast.
pub fn parse_external_address(addr: &str) -> Result<IpAddr> {
    let trimmed = addr.trim();
    let Ok(ip) = trimmed.parse::<IpAddr>() else {
        bail!("'{}' is not an IPv4 or IPv6 address", trimmed);
    };
    if ip.is_unspecified() {
        bail!("'{}' is an unspecified address", trimmed);
    }
    if ip.is_loopback() {
        bail!("'{}' is a loopback address", trimmed);
    }
    let link_local = match ip {
        IpAddr::V4(v4) => is_link_local_v4(v4),
        IpAddr::V6(v6) => is_link_local_v6(v6),
    };
    if link_local {
        bail!("'{}' is a link-local address", trimmed);
    }
    Ok(ip)
}

/// 169.254.0.0/16 and the 224.0.0.0/24 local multicast block.
fn is_link_local_v4(ip: Ipv4Addr) -> bool {
    ip.is_link_local() || ip.octets()[..3] == [224, 0, 0]
}

/// fe80::/10 and ff02::/16.
fn is_link_local_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    first & 0xffc0 == 0xfe80 || first == 0xff02
}
