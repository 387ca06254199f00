//! Typed resource declarations
//!
//! The cluster configuration document is tree-shaped XML, but the operator
//! models its own footprint as a flat collection of typed declarations keyed
//! by name, with constraint edges referencing those names. This keeps the
//! create/remove symmetry checkable as plain set equality over names.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use std::collections::BTreeSet;

/// OCF resource agent class shared by every primitive this operator manages
pub const AGENT_CLASS: &str = "ocf";
/// OCF provider namespace
pub const AGENT_PROVIDER: &str = "heartbeat";
/// Agent running the iSCSI target daemon
pub const TARGET_AGENT: &str = "iSCSITarget";
/// Agent exposing one logical unit of a target
pub const LU_AGENT: &str = "iSCSILogicalUnit";
/// Agent binding the floating service address
pub const IP_AGENT: &str = "IPaddr2";

/// Monitor operation interval applied to every managed primitive, seconds
const MONITOR_INTERVAL_SECS: u32 = 15;
/// Monitor operation timeout, seconds
const MONITOR_TIMEOUT_SECS: u32 = 40;

// =============================================================================
// Declarations
// =============================================================================

/// A named unit of cluster-managed work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Primitive {
    pub name: String,
    /// Agent type within `ocf:heartbeat`
    pub agent: String,
    /// Instance attributes, in emission order
    pub attributes: IndexMap<String, String>,
}

/// Startup/shutdown ordering edge: `first` must be running before `then`
/// starts, and stops only after `then` has stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConstraint {
    pub name: String,
    pub first: String,
    pub then: String,
}

/// Co-location edge: `resource` must run on the same node as `with`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColocationConstraint {
    pub name: String,
    pub resource: String,
    pub with: String,
}

/// Node preference for a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationConstraint {
    pub name: String,
    pub resource: String,
    pub node: String,
    pub score: i32,
}

/// One declaration in the cluster configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Primitive(Primitive),
    Order(OrderConstraint),
    Colocation(ColocationConstraint),
    Location(LocationConstraint),
}

impl Declaration {
    /// The cluster-wide unique name of this declaration.
    pub fn name(&self) -> &str {
        match self {
            Declaration::Primitive(p) => &p.name,
            Declaration::Order(o) => &o.name,
            Declaration::Colocation(c) => &c.name,
            Declaration::Location(l) => &l.name,
        }
    }

    /// Whether this declaration belongs in the constraints section rather
    /// than the resources section.
    pub fn is_constraint(&self) -> bool {
        !matches!(self, Declaration::Primitive(_))
    }
}

// =============================================================================
// Declaration Set
// =============================================================================

/// The cohesive set of declarations forming one logical unit's footprint:
/// target primitive, per-LUN primitives, service-address primitive, plus the
/// ordering, co-location and location edges tying them together. Created
/// atomically as a set, deleted atomically as the same set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationSet {
    declarations: Vec<Declaration>,
}

impl DeclarationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, declaration: Declaration) {
        self.declarations.push(declaration);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// All declaration names as a set, the unit of the symmetry contract.
    pub fn names(&self) -> BTreeSet<String> {
        self.declarations
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    /// Render the primitives as an XML fragment for the resources section.
    pub fn render_resources(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        for declaration in &self.declarations {
            if let Declaration::Primitive(primitive) = declaration {
                write_primitive(&mut writer, primitive)?;
            }
        }
        fragment_to_string(writer)
    }

    /// Render the constraint edges as an XML fragment for the constraints
    /// section.
    pub fn render_constraints(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        for declaration in &self.declarations {
            match declaration {
                Declaration::Primitive(_) => {}
                Declaration::Order(order) => {
                    let mut el = BytesStart::new("rsc_order");
                    el.push_attribute(("id", order.name.as_str()));
                    el.push_attribute(("first", order.first.as_str()));
                    el.push_attribute(("then", order.then.as_str()));
                    el.push_attribute(("kind", "Mandatory"));
                    write_empty(&mut writer, el)?;
                }
                Declaration::Colocation(colocation) => {
                    let mut el = BytesStart::new("rsc_colocation");
                    el.push_attribute(("id", colocation.name.as_str()));
                    el.push_attribute(("rsc", colocation.resource.as_str()));
                    el.push_attribute(("with-rsc", colocation.with.as_str()));
                    el.push_attribute(("score", "INFINITY"));
                    write_empty(&mut writer, el)?;
                }
                Declaration::Location(location) => {
                    let mut el = BytesStart::new("rsc_location");
                    el.push_attribute(("id", location.name.as_str()));
                    el.push_attribute(("rsc", location.resource.as_str()));
                    el.push_attribute(("node", location.node.as_str()));
                    el.push_attribute(("score", location.score.to_string().as_str()));
                    write_empty(&mut writer, el)?;
                }
            }
        }
        fragment_to_string(writer)
    }
}

impl FromIterator<Declaration> for DeclarationSet {
    fn from_iter<I: IntoIterator<Item = Declaration>>(iter: I) -> Self {
        Self {
            declarations: iter.into_iter().collect(),
        }
    }
}

// =============================================================================
// XML Rendering
// =============================================================================

fn write_primitive(writer: &mut Writer<Vec<u8>>, primitive: &Primitive) -> Result<()> {
    let mut el = BytesStart::new("primitive");
    el.push_attribute(("id", primitive.name.as_str()));
    el.push_attribute(("class", AGENT_CLASS));
    el.push_attribute(("provider", AGENT_PROVIDER));
    el.push_attribute(("type", primitive.agent.as_str()));
    write_start(writer, el)?;

    let ia_id = format!("{}-ia", primitive.name);
    let mut ia = BytesStart::new("instance_attributes");
    ia.push_attribute(("id", ia_id.as_str()));
    write_start(writer, ia)?;
    for (name, value) in &primitive.attributes {
        let mut nvpair = BytesStart::new("nvpair");
        let nvpair_id = format!("{}-{}", ia_id, name);
        nvpair.push_attribute(("id", nvpair_id.as_str()));
        nvpair.push_attribute(("name", name.as_str()));
        nvpair.push_attribute(("value", value.as_str()));
        write_empty(writer, nvpair)?;
    }
    write_end(writer, "instance_attributes")?;

    write_start(writer, BytesStart::new("operations"))?;
    let mut op = BytesStart::new("op");
    let op_id = format!("{}-monitor-{}", primitive.name, MONITOR_INTERVAL_SECS);
    op.push_attribute(("id", op_id.as_str()));
    op.push_attribute(("name", "monitor"));
    op.push_attribute(("interval", MONITOR_INTERVAL_SECS.to_string().as_str()));
    op.push_attribute(("timeout", MONITOR_TIMEOUT_SECS.to_string().as_str()));
    write_empty(writer, op)?;
    write_end(writer, "operations")?;

    write_end(writer, "primitive")
}

fn write_start(writer: &mut Writer<Vec<u8>>, el: BytesStart<'_>) -> Result<()> {
    writer
        .write_event(Event::Start(el))
        .map_err(|e| Error::Internal(format!("XML rendering failed: {}", e)))
}

fn write_empty(writer: &mut Writer<Vec<u8>>, el: BytesStart<'_>) -> Result<()> {
    writer
        .write_event(Event::Empty(el))
        .map_err(|e| Error::Internal(format!("XML rendering failed: {}", e)))
}

fn write_end(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| Error::Internal(format!("XML rendering failed: {}", e)))
}

fn fragment_to_string(writer: Writer<Vec<u8>>) -> Result<String> {
    String::from_utf8(writer.into_inner())
        .map_err(|e| Error::Internal(format!("XML rendering produced invalid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_primitive() -> Primitive {
        let mut attributes = IndexMap::new();
        attributes.insert("iqn".to_string(), "iqn.2020-01.com.example:disk0".to_string());
        attributes.insert("tid".to_string(), "0".to_string());
        Primitive {
            name: "p_iscsi_disk0".to_string(),
            agent: TARGET_AGENT.to_string(),
            attributes,
        }
    }

    #[test]
    fn test_primitive_rendering() {
        let mut set = DeclarationSet::new();
        set.push(Declaration::Primitive(sample_primitive()));

        let xml = set.render_resources().unwrap();
        assert!(xml.contains(r#"<primitive id="p_iscsi_disk0" class="ocf" provider="heartbeat" type="iSCSITarget">"#));
        assert!(xml.contains(r#"name="iqn" value="iqn.2020-01.com.example:disk0""#));
        assert!(xml.contains(r#"name="tid" value="0""#));
        assert!(xml.contains(r#"<op id="p_iscsi_disk0-monitor-15" name="monitor""#));

        // Primitives do not leak into the constraints fragment
        assert_eq!(set.render_constraints().unwrap(), "");
    }

    #[test]
    fn test_constraint_rendering() {
        let mut set = DeclarationSet::new();
        set.push(Declaration::Order(OrderConstraint {
            name: "ord_disk0_ip_before_target".to_string(),
            first: "p_iscsi_disk0_ip".to_string(),
            then: "p_iscsi_disk0".to_string(),
        }));
        set.push(Declaration::Colocation(ColocationConstraint {
            name: "col_disk0_target_with_ip".to_string(),
            resource: "p_iscsi_disk0".to_string(),
            with: "p_iscsi_disk0_ip".to_string(),
        }));
        set.push(Declaration::Location(LocationConstraint {
            name: "loc_disk0_node-a".to_string(),
            resource: "p_iscsi_disk0".to_string(),
            node: "node-a".to_string(),
            score: 100,
        }));

        let xml = set.render_constraints().unwrap();
        assert!(xml.contains(r#"<rsc_order id="ord_disk0_ip_before_target" first="p_iscsi_disk0_ip" then="p_iscsi_disk0" kind="Mandatory"/>"#));
        assert!(xml.contains(r#"<rsc_colocation id="col_disk0_target_with_ip" rsc="p_iscsi_disk0" with-rsc="p_iscsi_disk0_ip" score="INFINITY"/>"#));
        assert!(xml.contains(r#"<rsc_location id="loc_disk0_node-a" rsc="p_iscsi_disk0" node="node-a" score="100"/>"#));
        assert_eq!(set.render_resources().unwrap(), "");
    }

    #[test]
    fn test_names_are_a_set() {
        let mut set = DeclarationSet::new();
        set.push(Declaration::Primitive(sample_primitive()));
        set.push(Declaration::Order(OrderConstraint {
            name: "ord_disk0_ip_before_target".to_string(),
            first: "p_iscsi_disk0_ip".to_string(),
            then: "p_iscsi_disk0".to_string(),
        }));

        let names = set.names();
        assert_eq!(names.len(), 2);
        assert!(names.contains("p_iscsi_disk0"));
        assert!(names.contains("ord_disk0_ip_before_target"));
    }
}
