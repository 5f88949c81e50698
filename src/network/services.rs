//! Well-known port to service name table

use std::collections::HashMap;

use crate::network::Protocol;

/// Service database for naming ports the prober finds open
#[derive(Debug, Clone)]
pub struct ServiceDatabase {
    tcp_services: HashMap<u16, &'static str>,
    udp_services: HashMap<u16, &'static str>,
}

impl Default for ServiceDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceDatabase {
    pub fn new() -> Self {
        let tcp_services = HashMap::from([
            (21, "ftp"),
            (22, "ssh"),
            (23, "telnet"),
            (25, "smtp"),
            (53, "domain"),
            (80, "http"),
            (110, "pop3"),
            (111, "rpcbind"),
            (135, "msrpc"),
            (139, "netbios-ssn"),
            (143, "imap"),
            (389, "ldap"),
            (443, "https"),
            (445, "microsoft-ds"),
            (465, "smtps"),
            (587, "submission"),
            (631, "ipp"),
            (993, "imaps"),
            (995, "pop3s"),
            (1433, "ms-sql-s"),
            (1723, "pptp"),
            (2049, "nfs"),
            (3306, "mysql"),
            (3389, "ms-wbt-server"),
            (5432, "postgresql"),
            (5900, "vnc"),
            (5984, "couchdb"),
            (6379, "redis"),
            (8080, "http-proxy"),
            (8443, "https-alt"),
            (9200, "wap-wsp"),
            (27017, "mongod"),
        ]);

        let udp_services = HashMap::from([
            (53, "domain"),
            (67, "dhcps"),
            (68, "dhcpc"),
            (69, "tftp"),
            (123, "ntp"),
            (161, "snmp"),
            (162, "snmptrap"),
            (514, "syslog"),
            (1194, "openvpn"),
            (4500, "nat-t-ike"),
        ]);

        Self {
            tcp_services,
            udp_services,
        }
    }

    pub fn lookup(&self, protocol: Protocol, port: u16) -> Option<&'static str> {
        match protocol {
            Protocol::Tcp => self.tcp_services.get(&port).copied(),
            Protocol::Udp => self.udp_services.get(&port).copied(),
            Protocol::Sctp => None,
        }
    }

    /// Like [`lookup`](Self::lookup) but falls back to `"unknown"`.
    pub fn name_or_unknown(&self, protocol: Protocol, port: u16) -> &'static str {
        self.lookup(protocol, port).unwrap_or("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let db = ServiceDatabase::new();
        assert_eq!(db.lookup(Protocol::Tcp, 22), Some("ssh"));
        assert_eq!(db.lookup(Protocol::Udp, 161), Some("snmp"));
        assert_eq!(db.lookup(Protocol::Udp, 22), None);
        assert_eq!(db.name_or_unknown(Protocol::Tcp, 41234), "unknown");
    }
}
