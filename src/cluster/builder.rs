//! Resource definition builder
//!
//! Synthesizes the declaration set that runs one iSCSI target, its logical
//! units and its floating service address on a single cluster node, and the
//! inverse selection that removes exactly that footprint.
//!
//! The create and delete paths are symmetric by construction: removal selects
//! the names create would have produced for the same target and LUN, plus
//! every constraint edge referencing them, and nothing else. Deleting one
//! logical unit never disturbs unrelated targets, and shared target/IP
//! declarations survive while any other LUN of the same target remains.

use crate::cluster::config::ClusterConfiguration;
use crate::cluster::declarations::{
    ColocationConstraint, Declaration, DeclarationSet, LocationConstraint, OrderConstraint,
    Primitive, IP_AGENT, LU_AGENT, TARGET_AGENT,
};
use crate::cluster::tid::TargetId;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::net::IpAddr;

/// Netmask applied to the floating service address
const SERVICE_ADDRESS_PREFIX: &str = "24";
/// Node preference score for the location edges
const NODE_PREFERENCE_SCORE: i32 = 100;

// =============================================================================
// Parameters
// =============================================================================

/// Validated inputs for one target/LUN footprint.
#[derive(Debug, Clone)]
pub struct TargetParams {
    /// Full IQN advertised by the target
    pub iqn: String,
    /// Short target name, derived from the IQN
    pub target: String,
    /// Logical unit number
    pub lun: u8,
    /// Nodes the footprint may run on
    pub nodes: Vec<String>,
    /// Floating service address clients connect to
    pub service_ip: String,
    /// CHAP username, paired with `password`
    pub username: Option<String>,
    /// CHAP password, paired with `username`
    pub password: Option<String>,
    /// Comma-separated portal list handed to the target agent
    pub portals: Option<String>,
    /// Allocated cluster-wide target ID
    pub tid: TargetId,
}

// =============================================================================
// Declaration Names
// =============================================================================

pub fn target_primitive_name(target: &str) -> String {
    format!("p_iscsi_{}", target)
}

pub fn ip_primitive_name(target: &str) -> String {
    format!("p_iscsi_{}_ip", target)
}

pub fn lu_primitive_name(target: &str, lun: u8) -> String {
    format!("p_iscsi_{}_lu{}", target, lun)
}

fn order_ip_before_target(target: &str) -> String {
    format!("ord_{}_ip_before_target", target)
}

fn colocation_target_with_ip(target: &str) -> String {
    format!("col_{}_target_with_ip", target)
}

fn order_target_before_lu(target: &str, lun: u8) -> String {
    format!("ord_{}_target_before_lu{}", target, lun)
}

fn colocation_lu_with_target(target: &str, lun: u8) -> String {
    format!("col_{}_lu{}_with_target", target, lun)
}

fn location_name(target: &str, node: &str) -> String {
    format!("loc_{}_{}", target, node)
}

// =============================================================================
// Create Path
// =============================================================================

/// Build the declaration set for one target/LUN against the current
/// configuration snapshot.
///
/// On a fresh target this is the full footprint: target primitive, service
/// address primitive, LUN primitive, the ordering edges (address and target
/// reach Running before the LUN starts, and stop only after it), the
/// co-location edges pinning everything to one node, and a node preference
/// per eligible node. When the target primitive already exists, only the new
/// LUN's primitive and edges are produced.
pub fn build(
    config: &ClusterConfiguration,
    params: &TargetParams,
    device_path: &str,
) -> Result<DeclarationSet> {
    validate(config, params)?;
    if device_path.is_empty() {
        return Err(Error::InvalidParameter("empty device path".into()));
    }

    let target = &params.target;
    let target_name = target_primitive_name(target);
    let ip_name = ip_primitive_name(target);
    let lu_name = lu_primitive_name(target, params.lun);

    let mut set = DeclarationSet::new();
    let target_exists = config.contains(&target_name);

    if !target_exists {
        let mut target_attributes = IndexMap::new();
        target_attributes.insert("iqn".to_string(), params.iqn.clone());
        target_attributes.insert("tid".to_string(), params.tid.to_string());
        if let Some(portals) = &params.portals {
            target_attributes.insert("portals".to_string(), portals.clone());
        }
        if let (Some(username), Some(password)) = (&params.username, &params.password) {
            target_attributes.insert("incoming_username".to_string(), username.clone());
            target_attributes.insert("incoming_password".to_string(), password.clone());
        }
        set.push(Declaration::Primitive(Primitive {
            name: target_name.clone(),
            agent: TARGET_AGENT.to_string(),
            attributes: target_attributes,
        }));

        let mut ip_attributes = IndexMap::new();
        ip_attributes.insert("ip".to_string(), params.service_ip.clone());
        ip_attributes.insert("cidr_netmask".to_string(), SERVICE_ADDRESS_PREFIX.to_string());
        set.push(Declaration::Primitive(Primitive {
            name: ip_name.clone(),
            agent: IP_AGENT.to_string(),
            attributes: ip_attributes,
        }));
    }

    let mut lu_attributes = IndexMap::new();
    lu_attributes.insert("target_iqn".to_string(), params.iqn.clone());
    lu_attributes.insert("lun".to_string(), params.lun.to_string());
    lu_attributes.insert("path".to_string(), device_path.to_string());
    set.push(Declaration::Primitive(Primitive {
        name: lu_name.clone(),
        agent: LU_AGENT.to_string(),
        attributes: lu_attributes,
    }));

    if !target_exists {
        set.push(Declaration::Order(OrderConstraint {
            name: order_ip_before_target(target),
            first: ip_name.clone(),
            then: target_name.clone(),
        }));
        set.push(Declaration::Colocation(ColocationConstraint {
            name: colocation_target_with_ip(target),
            resource: target_name.clone(),
            with: ip_name.clone(),
        }));
        for node in &params.nodes {
            set.push(Declaration::Location(LocationConstraint {
                name: location_name(target, node),
                resource: target_name.clone(),
                node: node.clone(),
                score: NODE_PREFERENCE_SCORE,
            }));
        }
    }

    set.push(Declaration::Order(OrderConstraint {
        name: order_target_before_lu(target, params.lun),
        first: target_name.clone(),
        then: lu_name.clone(),
    }));
    set.push(Declaration::Colocation(ColocationConstraint {
        name: colocation_lu_with_target(target, params.lun),
        resource: lu_name,
        with: target_name,
    }));

    Ok(set)
}

// =============================================================================
// Delete Path
// =============================================================================

/// Select the names to remove for one target/LUN: the LUN primitive and its
/// edges, plus the shared target/IP primitives and their edges once no other
/// LUN of the target survives.
pub fn removal(
    config: &ClusterConfiguration,
    target: &str,
    lun: u8,
) -> Result<BTreeSet<String>> {
    let record = config
        .target(target)
        .ok_or_else(|| Error::TargetNotFound {
            target: target.to_string(),
        })?;
    if !record.luns.contains(&lun) {
        return Err(Error::LogicalUnitNotFound {
            target: target.to_string(),
            lun,
        });
    }

    let mut primitives = BTreeSet::new();
    primitives.insert(lu_primitive_name(target, lun));

    let survivors = record.luns.iter().any(|&l| l != lun);
    if !survivors {
        primitives.insert(record.primitive.clone());
        let ip_name = ip_primitive_name(target);
        if config.contains(&ip_name) {
            primitives.insert(ip_name);
        }
    }

    let mut names = primitives.clone();
    names.extend(config.constraints_referencing(&primitives));
    Ok(names)
}

// =============================================================================
// Validation
// =============================================================================

/// Reject malformed parameters before any declaration is built or any
/// external call is made. The configuration-dependent checks live here too,
/// so an orchestrator can validate the whole request against a fresh
/// snapshot before it mutates anything.
pub fn validate(config: &ClusterConfiguration, params: &TargetParams) -> Result<()> {
    if !valid_name(&params.target) {
        return Err(Error::InvalidParameter(format!(
            "invalid target name: {:?}",
            params.target
        )));
    }
    if params.nodes.is_empty() {
        return Err(Error::InvalidParameter(
            "at least one eligible node is required".into(),
        ));
    }
    if params.service_ip.parse::<IpAddr>().is_err() {
        return Err(Error::InvalidParameter(format!(
            "invalid service address: {}",
            params.service_ip
        )));
    }
    if params.username.is_some() != params.password.is_some() {
        return Err(Error::InvalidParameter(
            "username and password must be supplied together".into(),
        ));
    }

    if config.contains(&lu_primitive_name(&params.target, params.lun)) {
        return Err(Error::InvalidParameter(format!(
            "logical unit {} already exists for target {}",
            params.lun, params.target
        )));
    }
    // Adding a LUN to an existing target; the advertised IQN must match.
    if let Some(record) = config.target(&params.target) {
        if record.iqn.as_deref().is_some_and(|iqn| iqn != params.iqn) {
            return Err(Error::InvalidParameter(format!(
                "target {} already exists with a different IQN",
                params.target
            )));
        }
    }
    Ok(())
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::config::parse_version;
    use crate::cluster::fixtures;
    use crate::domain::ports::CibDocument;
    use assert_matches::assert_matches;

    fn parse(xml: String) -> ClusterConfiguration {
        let version = parse_version(&xml).unwrap();
        ClusterConfiguration::parse(&CibDocument { xml, version }).unwrap()
    }

    fn empty_config() -> ClusterConfiguration {
        parse(fixtures::empty_cib())
    }

    const DEVICE: &str = "/dev/drbd1000";

    fn params() -> TargetParams {
        TargetParams {
            iqn: "iqn.2020-01.com.example:disk0".into(),
            target: "disk0".into(),
            lun: 0,
            nodes: vec!["node-a".into(), "node-b".into()],
            service_ip: "10.0.0.5".into(),
            username: None,
            password: None,
            portals: None,
            tid: 0,
        }
    }

    #[test]
    fn test_full_footprint_on_fresh_target() {
        let set = build(&empty_config(), &params(), DEVICE).unwrap();
        let names = set.names();

        for expected in [
            "p_iscsi_disk0",
            "p_iscsi_disk0_ip",
            "p_iscsi_disk0_lu0",
            "ord_disk0_ip_before_target",
            "col_disk0_target_with_ip",
            "ord_disk0_target_before_lu0",
            "col_disk0_lu0_with_target",
            "loc_disk0_node-a",
            "loc_disk0_node-b",
        ] {
            assert!(names.contains(expected), "missing {}", expected);
        }
        assert_eq!(names.len(), 9);
    }

    #[test]
    fn test_credentials_and_portals_are_carried() {
        let mut p = params();
        p.username = Some("admin".into());
        p.password = Some("secret".into());
        p.portals = Some("192.168.1.1:3260".into());

        let set = build(&empty_config(), &p, DEVICE).unwrap();
        let xml = set.render_resources().unwrap();
        assert!(xml.contains(r#"name="incoming_username" value="admin""#));
        assert!(xml.contains(r#"name="incoming_password" value="secret""#));
        assert!(xml.contains(r#"name="portals" value="192.168.1.1:3260""#));
    }

    #[test]
    fn test_second_lun_reuses_shared_declarations() {
        let config = parse(fixtures::populated_cib());
        let mut p = params();
        p.lun = 2;
        p.tid = 1;

        let set = build(&config, &p, "/dev/drbd1002").unwrap();
        let names = set.names();
        assert_eq!(names.len(), 3);
        assert!(names.contains("p_iscsi_disk0_lu2"));
        assert!(names.contains("ord_disk0_target_before_lu2"));
        assert!(names.contains("col_disk0_lu2_with_target"));
    }

    #[test]
    fn test_existing_lun_is_rejected() {
        let config = parse(fixtures::populated_cib());
        // LUN 0 already exists for disk0
        assert_matches!(
            build(&config, &params(), DEVICE),
            Err(Error::InvalidParameter(_))
        );
    }

    #[test]
    fn test_iqn_mismatch_is_rejected() {
        let config = parse(fixtures::populated_cib());
        let mut p = params();
        p.lun = 2;
        p.iqn = "iqn.2020-01.com.example:other".into();
        p.target = "disk0".into();
        assert_matches!(build(&config, &p, DEVICE), Err(Error::InvalidParameter(_)));
    }

    #[test]
    fn test_validation_precedes_building() {
        let empty = empty_config();

        let mut p = params();
        p.service_ip = "not-an-address".into();
        assert_matches!(validate(&empty, &p), Err(Error::InvalidParameter(_)));

        let mut p = params();
        p.target = "bad name".into();
        assert_matches!(validate(&empty, &p), Err(Error::InvalidParameter(_)));

        let mut p = params();
        p.nodes = Vec::new();
        assert_matches!(validate(&empty, &p), Err(Error::InvalidParameter(_)));

        let mut p = params();
        p.username = Some("admin".into());
        assert_matches!(validate(&empty, &p), Err(Error::InvalidParameter(_)));

        assert_matches!(
            build(&empty, &params(), ""),
            Err(Error::InvalidParameter(_))
        );
    }

    #[test]
    fn test_create_remove_symmetry() {
        let empty = empty_config();
        let set = build(&empty, &params(), DEVICE).unwrap();

        let updated = empty.with_declarations(&set).unwrap();
        let config = parse(updated);

        let removed = removal(&config, "disk0", 0).unwrap();
        assert_eq!(removed, set.names());

        // Applying the removal erases the footprint entirely
        let document = config.without_declarations(&removed);
        let emptied = parse(document);
        for name in &removed {
            assert!(!emptied.contains(name), "{} survived removal", name);
        }
    }

    #[test]
    fn test_multi_lun_isolation() {
        let config = parse(fixtures::populated_cib());
        let removed = removal(&config, "disk0", 0).unwrap();

        assert!(removed.contains("p_iscsi_disk0_lu0"));
        assert!(removed.contains("ord_disk0_target_before_lu0"));
        assert!(removed.contains("col_disk0_lu0_with_target"));

        // LUN 1 survives, so the shared footprint stays
        assert!(!removed.contains("p_iscsi_disk0"));
        assert!(!removed.contains("p_iscsi_disk0_ip"));
        assert!(!removed.contains("ord_disk0_ip_before_target"));
        assert!(!removed.contains("col_disk0_target_with_ip"));
        assert!(!removed.contains("p_iscsi_disk0_lu1"));
        assert!(!removed.contains("ord_disk0_target_before_lu1"));
        assert!(!removed.contains("col_disk0_lu1_with_target"));
    }

    #[test]
    fn test_last_lun_removes_shared_footprint() {
        let config = parse(fixtures::populated_cib());

        // Remove LUN 0 first
        let document = config.without_declarations(&removal(&config, "disk0", 0).unwrap());
        let config = parse(document);

        let removed = removal(&config, "disk0", 1).unwrap();
        assert!(removed.contains("p_iscsi_disk0_lu1"));
        assert!(removed.contains("p_iscsi_disk0"));
        assert!(removed.contains("p_iscsi_disk0_ip"));
        assert!(removed.contains("ord_disk0_ip_before_target"));
        assert!(removed.contains("col_disk0_target_with_ip"));
        assert!(removed.contains("loc_disk0_node-a"));
    }

    #[test]
    fn test_unknown_target_and_lun() {
        let config = parse(fixtures::populated_cib());
        assert_matches!(
            removal(&config, "absent", 0),
            Err(Error::TargetNotFound { .. })
        );
        assert_matches!(
            removal(&config, "disk0", 9),
            Err(Error::LogicalUnitNotFound { lun: 9, .. })
        );
    }
}
