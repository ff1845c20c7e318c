//! Parser for `iscsiadm -m discovery -t sendtargets` output.
//!
//! Each record is a single line of the form `host:port,tag iqn`, for example
//! `10.10.5.100:3260,1 iqn.2010-01.com.solidfire:abcd.vol1.42`. Every
//! non-blank line must match this shape; anything else is rejected rather
//! than guessed at.

use crate::types::IscsiTarget;

use super::SessionError;

/// One advertised target.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscoveryRecord {
    /// Portal host part.
    pub ip: String,
    /// Portal in `host:port` form.
    pub portal: String,
    /// Target portal group tag.
    pub tag: u32,
    /// Target IQN.
    pub iqn: String,
}

impl DiscoveryRecord {
    /// Parses a single discovery line.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::MalformedDiscovery`] naming what was wrong.
    pub fn parse(line: &str) -> Result<Self, SessionError> {
        let malformed = |reason| SessionError::MalformedDiscovery {
            line: line.to_owned(),
            reason,
        };

        let mut fields = line.split_whitespace();
        let (Some(address), Some(iqn), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(malformed("expected 'portal,tag iqn'"));
        };
        let (portal, tag_text) = address
            .rsplit_once(',')
            .ok_or_else(|| malformed("missing portal group tag"))?;
        let tag = tag_text
            .parse::<u32>()
            .map_err(|_| malformed("portal group tag is not numeric"))?;
        let (ip, port) = portal
            .rsplit_once(':')
            .ok_or_else(|| malformed("portal has no port"))?;
        if ip.is_empty() {
            return Err(malformed("portal has no host"));
        }
        port.parse::<u16>()
            .map_err(|_| malformed("portal port is not numeric"))?;
        if !iqn.starts_with("iqn.") && !iqn.starts_with("eui.") && !iqn.starts_with("naa.") {
            return Err(malformed("target name is not an iSCSI name"));
        }

        Ok(Self {
            ip: ip.trim_start_matches('[').trim_end_matches(']').to_owned(),
            portal: portal.to_owned(),
            tag,
            iqn: iqn.to_owned(),
        })
    }
}

/// Parses every record in `output`.
///
/// # Errors
///
/// Returns [`SessionError::MalformedDiscovery`] for the first bad line.
pub fn parse_records(output: &str) -> Result<Vec<DiscoveryRecord>, SessionError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(DiscoveryRecord::parse)
        .collect()
}

/// Picks the record advertising `iqn` out of discovery `output` and turns it
/// into a login target. The first matching portal wins.
///
/// # Errors
///
/// Returns [`SessionError::MalformedDiscovery`] for unparseable output and
/// [`SessionError::TargetNotFound`] when `iqn` is not advertised.
pub fn select_target(output: &str, queried: &str, iqn: &str) -> Result<IscsiTarget, SessionError> {
    let records = parse_records(output)?;
    let record = records
        .into_iter()
        .find(|record| record.iqn == iqn)
        .ok_or_else(|| SessionError::TargetNotFound {
            portal: queried.to_owned(),
            iqn: iqn.to_owned(),
        })?;
    let discovery = format!("{},{} {}", record.portal, record.tag, record.iqn);
    Ok(IscsiTarget {
        ip: record.ip,
        portal: record.portal,
        iqn: record.iqn,
        discovery: Some(discovery),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const IQN: &str = "iqn.2010-01.com.solidfire:7rtr.pg-data.42";

    #[test]
    fn parses_a_record() {
        let record = DiscoveryRecord::parse(&format!("10.10.5.100:3260,1 {IQN}"))
            .expect("record parses");
        assert_eq!(record.ip, "10.10.5.100");
        assert_eq!(record.portal, "10.10.5.100:3260");
        assert_eq!(record.tag, 1);
        assert_eq!(record.iqn, IQN);
    }

    #[test]
    fn parses_bracketed_ipv6_portal() {
        let record = DiscoveryRecord::parse(&format!("[fd00::5]:3260,2 {IQN}"))
            .expect("record parses");
        assert_eq!(record.ip, "fd00::5");
        assert_eq!(record.portal, "[fd00::5]:3260");
        assert_eq!(record.tag, 2);
    }

    #[rstest]
    #[case("10.10.5.100:3260,1", "expected 'portal,tag iqn'")]
    #[case("10.10.5.100:3260,1 iqn.a extra", "expected 'portal,tag iqn'")]
    #[case("10.10.5.100:3260 iqn.a", "missing portal group tag")]
    #[case("10.10.5.100:3260,x iqn.a", "portal group tag is not numeric")]
    #[case("10.10.5.100,1 iqn.a", "portal has no port")]
    #[case("10.10.5.100:iscsi,1 iqn.a", "portal port is not numeric")]
    #[case("10.10.5.100:3260,1 target-a", "target name is not an iSCSI name")]
    fn rejects_malformed_lines(#[case] line: &str, #[case] expected: &str) {
        let err = DiscoveryRecord::parse(line).expect_err("line is malformed");
        assert!(
            matches!(&err, SessionError::MalformedDiscovery { reason, .. } if *reason == expected),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn selects_matching_target_among_many() {
        let output = format!(
            "10.10.5.100:3260,1 iqn.2010-01.com.solidfire:7rtr.other.41\n\
             10.10.5.100:3260,1 {IQN}\n\n"
        );
        let target = select_target(&output, "10.10.5.100:3260", IQN).expect("target found");
        assert_eq!(target.portal, "10.10.5.100:3260");
        assert_eq!(target.iqn, IQN);
        assert_eq!(
            target.discovery.as_deref(),
            Some(format!("10.10.5.100:3260,1 {IQN}").as_str())
        );
    }

    #[test]
    fn missing_target_is_reported() {
        let err = select_target(
            "10.10.5.100:3260,1 iqn.2010-01.com.solidfire:7rtr.other.41",
            "10.10.5.100:3260",
            IQN,
        )
        .expect_err("target absent");
        assert!(matches!(err, SessionError::TargetNotFound { .. }));
    }
}
