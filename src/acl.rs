use std::net::IpAddr;

use ipnet::IpNet;

/// Network whitelist: `None` allows every client, `Some(vec![])` denies
/// every client, otherwise a client is allowed iff some network contains it.
#[derive(Debug, Clone, Default)]
pub struct Acl {
    whitelist: Option<Vec<IpNet>>,
}

impl Acl {
    pub fn new(whitelist: Option<Vec<IpNet>>) -> Self {
        Self { whitelist }
    }

    /// Parses CIDR strings such as `10.0.0.0/8` or `2001:db8::/32`. An
    /// unparsable entry is skipped with a warning rather than failing the
    /// whole list, so one typo in a long whitelist doesn't lock everyone out.
    pub fn from_cidr_strings(entries: Option<&[String]>) -> Self {
        let whitelist = entries.map(|list| {
            list.iter()
                .filter_map(|s| match s.parse::<IpNet>() {
                    Ok(net) => Some(net),
                    Err(e) => {
                        tracing::warn!(cidr = %s, error = %e, "ignoring unparsable networkWhitelist entry");
                        None
                    }
                })
                .collect()
        });
        Self { whitelist }
    }

    pub fn allows(&self, addr: IpAddr) -> bool {
        match &self.whitelist {
            None => true,
            Some(nets) => nets.iter().any(|n| n.contains(&addr)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn no_whitelist_allows_everyone() {
        let acl = Acl::new(None);
        assert!(acl.allows(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 5))));
    }

    #[test]
    fn empty_whitelist_denies_everyone() {
        let acl = Acl::new(Some(vec![]));
        assert!(!acl.allows(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
    }

    #[test]
    fn membership_is_checked_against_any_network() {
        let acl = Acl::new(Some(vec!["10.0.0.0/8".parse().unwrap()]));
        assert!(acl.allows(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))));
        assert!(!acl.allows(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 5))));
    }

    #[test]
    fn unparsable_entries_are_skipped_not_fatal() {
        let acl = Acl::from_cidr_strings(Some(&["not-a-cidr".to_string(), "10.0.0.0/8".to_string()]));
        assert!(acl.allows(IpAddr::V4(Ipv4Addr::new(10, 5, 5, 5))));
    }
}
