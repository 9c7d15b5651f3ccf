use std::{
    collections::BTreeSet,
    net::{Ipv4Addr, Ipv6Addr},
};

pub const IPV4_PREFIX: &str = "10.66.66.";
pub const IPV6_PREFIX: &str = "fd42:42:42:1::";

const ADDRESS_KEY: &str = "Address = ";
const FIRST_HOST: u32 = 2;
const LAST_HOST: u32 = 254;

/// A client's place in the tunnel network. The IPv6 address reuses the IPv4
/// host number as its last group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelAddress {
    host: u8,
}

impl TunnelAddress {
    pub fn host(&self) -> u8 {
        self.host
    }

    pub fn ipv4(&self) -> Ipv4Addr {
        Ipv4Addr::new(10, 66, 66, self.host)
    }

    pub fn ipv6(&self) -> Ipv6Addr {
        Ipv6Addr::new(0xfd42, 0x42, 0x42, 0x1, 0, 0, 0, decimal_digits_as_hex(self.host))
    }
}

// The host number is written out in decimal (`::12`), which reads back as a hex group.
fn decimal_digits_as_hex(n: u8) -> u16 {
    let n = u16::from(n);
    (n / 100) * 0x100 + (n / 10 % 10) * 0x10 + n % 10
}

/// Host numbers found in the `Address = ` lines of existing client configs.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UsedAddresses {
    pub ipv4: BTreeSet<u32>,
    /// Collected for completeness, allocation is driven by `ipv4` alone.
    pub ipv6: BTreeSet<u32>,
}

impl UsedAddresses {
    pub fn scan<'a>(configs: impl IntoIterator<Item = &'a str>) -> Self {
        let mut used = Self::default();
        for line in configs.into_iter().flat_map(str::lines) {
            let Some(value) = line.strip_prefix(ADDRESS_KEY) else {
                continue;
            };
            for addr in value.split(',') {
                used.record(addr);
            }
        }
        used
    }

    fn record(&mut self, addr: &str) {
        let ip = addr.trim().split('/').next().unwrap_or_default();

        // anything unparsable is skipped
        if let Some(host) = ip.strip_prefix(IPV4_PREFIX) {
            if let Ok(host) = host.parse() {
                self.ipv4.insert(host);
            }
        } else if let Some(host) = ip.strip_prefix(IPV6_PREFIX) {
            if let Ok(host) = host.parse() {
                self.ipv6.insert(host);
            }
        }
    }

    /// One past the highest used host, gaps are never reused.
    pub fn next_free(&self) -> Option<TunnelAddress> {
        let next = self
            .ipv4
            .iter()
            .next_back()
            .map_or(FIRST_HOST, |max| max.saturating_add(1))
            .max(FIRST_HOST);

        if next > LAST_HOST {
            return None;
        }
        u8::try_from(next).ok().map(|host| TunnelAddress { host })
    }
}

/// Next address after everything referenced by `configs`, `None` once the
/// range is used up.
pub fn allocate_next<'a>(configs: impl IntoIterator<Item = &'a str>) -> Option<TunnelAddress> {
    UsedAddresses::scan(configs).next_free()
}
