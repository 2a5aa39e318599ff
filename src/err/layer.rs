/// Layers on which an error can occur.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Layer {
    /// Error occurred in the Ethernet II header.
    EthernetHeader,
    /// Error occurred in the 802.1Q VLAN tag.
    VlanHeader,
    /// Error occurred in the IPv4 header.
    Ipv4Header,
    /// Error occurred in the IPv6 header.
    Ipv6Header,
    /// Error occurred in the TCP header.
    TcpHeader,
    /// Error occurred in the UDP header.
    UdpHeader,
    /// Error occurred in the DNS message header.
    DnsHeader,
}

impl Layer {
    /// String that is used as a title for the error.
    pub fn error_title(&self) -> &'static str {
        use Layer::*;
        match self {
            EthernetHeader => "Ethernet Header Error",
            VlanHeader => "VLAN Tag Error",
            Ipv4Header => "IPv4 Header Error",
            Ipv6Header => "IPv6 Header Error",
            TcpHeader => "TCP Header Error",
            UdpHeader => "UDP Header Error",
            DnsHeader => "DNS Header Error",
        }
    }
}

impl core::fmt::Display for Layer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use Layer::*;
        match self {
            EthernetHeader => write!(f, "Ethernet header"),
            VlanHeader => write!(f, "VLAN tag"),
            Ipv4Header => write!(f, "IPv4 header"),
            Ipv6Header => write!(f, "IPv6 header"),
            TcpHeader => write!(f, "TCP header"),
            UdpHeader => write!(f, "UDP header"),
            DnsHeader => write!(f, "DNS header"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Layer::*;

    #[test]
    fn error_title() {
        let tests = [
            (EthernetHeader, "Ethernet Header Error"),
            (VlanHeader, "VLAN Tag Error"),
            (Ipv4Header, "IPv4 Header Error"),
            (Ipv6Header, "IPv6 Header Error"),
            (TcpHeader, "TCP Header Error"),
            (UdpHeader, "UDP Header Error"),
            (DnsHeader, "DNS Header Error"),
        ];
        for (layer, expected) in tests {
            assert_eq!(expected, layer.error_title());
        }
    }

    #[test]
    fn fmt() {
        let tests = [
            (EthernetHeader, "Ethernet header"),
            (VlanHeader, "VLAN tag"),
            (Ipv4Header, "IPv4 header"),
            (Ipv6Header, "IPv6 header"),
            (TcpHeader, "TCP header"),
            (UdpHeader, "UDP header"),
            (DnsHeader, "DNS header"),
        ];
        for (layer, expected) in tests {
            assert_eq!(expected, format!("{layer}"));
        }
    }

    #[test]
    fn clone_eq() {
        assert_eq!(TcpHeader, TcpHeader.clone());
    }
}
