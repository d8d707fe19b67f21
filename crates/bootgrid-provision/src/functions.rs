//! Filters registered on top of the minijinja builtins.
//!
//! All of them are pure string helpers. Nothing here touches the clock,
//! the filesystem or the network.

use std::net::Ipv4Addr;

use minijinja::{Environment, Error, ErrorKind};

pub(crate) fn register(env: &mut Environment<'_>) {
    env.add_filter("quote", quote);
    env.add_filter("trim_prefix", trim_prefix);
    env.add_filter("trim_suffix", trim_suffix);
    env.add_filter("cidr", cidr);
}

/// Double-quote a value for shell or kernel command lines.
fn quote(value: String) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn trim_prefix(value: String, prefix: &str) -> String {
    value
        .strip_prefix(prefix)
        .map(str::to_string)
        .unwrap_or(value)
}

fn trim_suffix(value: String, suffix: &str) -> String {
    value
        .strip_suffix(suffix)
        .map(str::to_string)
        .unwrap_or(value)
}

/// `{{ dev.ipaddr | cidr(dev.netmask) }}` gives `10.0.0.5/24`.
fn cidr(ip: &str, netmask: &str) -> Result<String, Error> {
    let ip: Ipv4Addr = ip
        .parse()
        .map_err(|_| Error::new(ErrorKind::InvalidOperation, format!("not an IPv4 address: {ip:?}")))?;
    let mask: Ipv4Addr = netmask.parse().map_err(|_| {
        Error::new(ErrorKind::InvalidOperation, format!("not a netmask: {netmask:?}"))
    })?;
    let bits = u32::from(mask);
    if bits.leading_ones() != bits.count_ones() {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("non-contiguous netmask: {netmask}"),
        ));
    }
    Ok(format!("{ip}/{}", bits.count_ones()))
}
