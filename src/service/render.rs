//! Text formats written to the server. The client config is also read back by
//! the allocator, so its layout must stay stable.

use std::fmt::Write;

use super::{ClientName, KeyPair, ServerParams, TunnelAddress};

pub fn client_config(keys: &KeyPair, address: &TunnelAddress, server: &ServerParams) -> String {
    let mut addresses = format!("{}/32", address.ipv4());
    if server.ipv6 {
        let _ = write!(addresses, ",{}/64", address.ipv6());
    }

    format!(
        "[Interface]
PrivateKey = {priv_key}
Address = {addresses}
DNS = {dns}

[Peer]
PublicKey = {pub_key}
Endpoint = {endpoint}
AllowedIPs = {allowed_ips}
",
        priv_key = keys.private_key,
        dns = server.dns,
        pub_key = server.public_key,
        endpoint = server.endpoint(),
        allowed_ips = server.allowed_ips,
    )
}

pub fn peer_entry(name: &ClientName, public_key: &str, address: &TunnelAddress) -> String {
    format!(
        "
# Client: {name}
[Peer]
PublicKey = {public_key}
AllowedIPs = {ip}/32
",
        ip = address.ipv4(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{address::allocate_next, UsedAddresses};

    fn server(ipv6: bool) -> ServerParams {
        ServerParams {
            public_key: "c2VydmVyc2VydmVyc2VydmVyc2VydmVyc2VydmVyc2U=".to_owned(),
            host: "vpn.example.com".to_owned(),
            port: 51820,
            dns: "1.1.1.1, 1.0.0.1".to_owned(),
            allowed_ips: "0.0.0.0/0,::/0".to_owned(),
            ipv6,
        }
    }

    fn keys() -> KeyPair {
        KeyPair {
            private_key: "Y2xpZW50Y2xpZW50Y2xpZW50Y2xpZW50Y2xpZW50Y2w=".to_owned(),
            public_key: "cHVibGljcHVibGljcHVibGljcHVibGljcHVibGljcHU=".to_owned(),
        }
    }

    fn address(host: u8) -> TunnelAddress {
        let ledger = format!("Address = 10.66.66.{}/32", host - 1);
        allocate_next([ledger.as_str()]).unwrap()
    }

    #[test]
    fn renders_exact_client_config() {
        assert_eq!(
            client_config(&keys(), &address(7), &server(true)),
            "[Interface]
PrivateKey = Y2xpZW50Y2xpZW50Y2xpZW50Y2xpZW50Y2xpZW50Y2w=
Address = 10.66.66.7/32,fd42:42:42:1::7/64
DNS = 1.1.1.1, 1.0.0.1

[Peer]
PublicKey = c2VydmVyc2VydmVyc2VydmVyc2VydmVyc2VydmVyc2U=
Endpoint = vpn.example.com:51820
AllowedIPs = 0.0.0.0/0,::/0
"
        );
    }

    #[test]
    fn ipv6_can_be_left_out() {
        let config = client_config(&keys(), &address(7), &server(false));
        assert!(config.contains("\nAddress = 10.66.66.7/32\n"));
        assert!(!config.contains("fd42"));
    }

    #[test]
    fn rendering_is_stable() {
        let (keys, address, server) = (keys(), address(42), server(true));
        assert_eq!(
            client_config(&keys, &address, &server),
            client_config(&keys, &address, &server)
        );
    }

    #[test]
    fn rendered_address_reads_back() {
        let address = address(123);
        let config = client_config(&keys(), &address, &server(true));

        let used = UsedAddresses::scan([config.as_str()]);
        assert_eq!(used.ipv4.into_iter().collect::<Vec<_>>(), vec![123]);
        assert_eq!(used.ipv6.into_iter().collect::<Vec<_>>(), vec![123]);

        let line = config
            .lines()
            .find_map(|l| l.strip_prefix("Address = "))
            .unwrap();
        assert_eq!(
            line,
            format!("{}/32,{}/64", address.ipv4(), address.ipv6())
        );
    }

    #[test]
    fn renders_peer_entry() {
        let name: ClientName = "phone".parse().unwrap();
        assert_eq!(
            peer_entry(&name, &keys().public_key, &address(3)),
            "
# Client: phone
[Peer]
PublicKey = cHVibGljcHVibGljcHVibGljcHVibGljcHVibGljcHU=
AllowedIPs = 10.66.66.3/32
"
        );
    }
}
