//! Hardware address lookup by peer IP.
//!
//! EFI firmware fetches `/efiboot/<file>` without identifying itself, so the
//! node is recovered from the kernel's neighbour table.

use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;

use tracing::debug;

pub trait NeighborTable: Send + Sync {
    /// Hardware address last seen for `ip`, if any.
    fn hwaddr(&self, ip: IpAddr) -> Option<String>;
}

/// Reads `/proc/net/arp`.
#[derive(Debug, Clone)]
pub struct ProcNetArp {
    path: PathBuf,
}

impl Default for ProcNetArp {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/proc/net/arp"),
        }
    }
}

impl ProcNetArp {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl NeighborTable for ProcNetArp {
    fn hwaddr(&self, ip: IpAddr) -> Option<String> {
        let table = match fs::read_to_string(&self.path) {
            Ok(table) => table,
            Err(err) => {
                debug!(path = ?self.path, %err, "cannot read neighbour table");
                return None;
            }
        };
        lookup(&table, ip.to_canonical())
    }
}

/// Columns: IP address, HW type, Flags, HW address, Mask, Device.
fn lookup(table: &str, ip: IpAddr) -> Option<String> {
    table.lines().skip(1).find_map(|line| {
        let cols: Vec<&str> = line.split_whitespace().collect();
        let [addr, _, flags, hwaddr, ..] = cols.as_slice() else {
            return None;
        };
        // Flags 0x0 marks an incomplete entry.
        let complete = *flags != "0x0" && *hwaddr != "00:00:00:00:00:00";
        (complete && addr.parse::<IpAddr>().ok() == Some(ip)).then(|| hwaddr.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
IP address       HW type     Flags       HW address            Mask     Device
10.0.0.5         0x1         0x2         aa:bb:cc:00:00:01     *        eth0
10.0.0.6         0x1         0x0         00:00:00:00:00:00     *        eth0
10.0.0.7         0x1         0x2         aa:bb:cc:00:00:07     *        eth1
";

    #[test]
    fn finds_complete_entries() {
        assert_eq!(
            lookup(TABLE, "10.0.0.5".parse().unwrap()).as_deref(),
            Some("aa:bb:cc:00:00:01")
        );
        assert_eq!(
            lookup(TABLE, "10.0.0.7".parse().unwrap()).as_deref(),
            Some("aa:bb:cc:00:00:07")
        );
        assert_eq!(lookup(TABLE, "10.0.0.6".parse().unwrap()), None);
        assert_eq!(lookup(TABLE, "10.0.0.9".parse().unwrap()), None);
    }

    #[test]
    fn reads_file_and_maps_ipv6_peers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arp");
        fs::write(&path, TABLE).unwrap();
        let arp = ProcNetArp::with_path(&path);
        assert_eq!(
            arp.hwaddr("::ffff:10.0.0.5".parse().unwrap()).as_deref(),
            Some("aa:bb:cc:00:00:01")
        );
        assert_eq!(ProcNetArp::with_path(dir.path().join("missing")).hwaddr("10.0.0.5".parse().unwrap()), None);
    }
}
