//! Cluster configuration snapshot
//!
//! Parses one fetched revision of the cluster configuration document into a
//! typed, immutable snapshot: the declarations it holds, their classification,
//! the allocated target IDs, and the observed run states from the status
//! section. All mutation happens by building a new document from the snapshot
//! plus a declaration set; the fetched text itself is never edited in place.
//!
//! Snapshots are created per read and discarded after the operation that
//! needed them. The source of truth is the cluster store, which other actors
//! may mutate between calls.

use crate::cluster::declarations::{DeclarationSet, IP_AGENT, LU_AGENT, TARGET_AGENT};
use crate::cluster::tid::TargetId;
use crate::domain::ports::{CibDocument, CibVersion, RunState};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

// =============================================================================
// Declaration Classification
// =============================================================================

/// Kind tag attached to each declaration found in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    /// An iSCSI target primitive
    Target,
    /// An iSCSI logical unit primitive
    LogicalUnit,
    /// A floating service-address primitive
    ServiceAddress,
    /// An ordering, co-location or location edge
    Constraint,
    /// Any other cluster resource not managed by this operator
    Other,
}

/// One iSCSI target reconstructed from the configuration: its short name,
/// primitive id, allocated target ID and the LUNs exposed under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
    pub name: String,
    pub primitive: String,
    pub iqn: Option<String>,
    pub tid: Option<TargetId>,
    pub luns: Vec<u8>,
}

// =============================================================================
// Cluster Configuration
// =============================================================================

/// Immutable snapshot of one revision of the cluster configuration document.
#[derive(Debug, Clone)]
pub struct ClusterConfiguration {
    version: CibVersion,
    source: String,
    declarations: IndexMap<String, DeclarationKind>,
    declaration_ranges: HashMap<String, Range<usize>>,
    constraint_refs: HashMap<String, Vec<String>>,
    resources_range: Range<usize>,
    constraints_range: Range<usize>,
    run_states: HashMap<String, RunState>,
    pub targets: Vec<TargetRecord>,
    pub tid_set: BTreeSet<TargetId>,
}

impl ClusterConfiguration {
    /// Parse a fetched document into a snapshot.
    pub fn parse(document: &CibDocument) -> Result<Self> {
        let tree = roxmltree::Document::parse(&document.xml)
            .map_err(|e| Error::CibParse(format!("not well-formed XML: {}", e)))?;
        let root = tree.root_element();
        if root.tag_name().name() != "cib" {
            return Err(Error::CibParse(format!(
                "unexpected document root <{}>",
                root.tag_name().name()
            )));
        }

        let resources = find_section(&tree, "resources")?;
        let constraints = find_section(&tree, "constraints")?;

        let mut declarations = IndexMap::new();
        let mut declaration_ranges = HashMap::new();
        let mut targets: IndexMap<String, TargetRecord> = IndexMap::new();
        let mut orphan_luns: Vec<(String, u8)> = Vec::new();
        let mut tid_set = BTreeSet::new();

        for node in resources.children().filter(|n| n.is_element()) {
            let Some(id) = node.attribute("id") else {
                continue;
            };
            declaration_ranges.insert(id.to_string(), node.range());

            let kind = match node.attribute("type") {
                Some(TARGET_AGENT) => {
                    let attributes = instance_attributes(&node);
                    let iqn = attributes.get("iqn").cloned();
                    let tid = attributes.get("tid").and_then(|v| v.parse::<TargetId>().ok());
                    if let Some(tid) = tid {
                        tid_set.insert(tid);
                    }
                    let name = iqn
                        .as_deref()
                        .and_then(target_name_from_iqn)
                        .unwrap_or(id)
                        .to_string();
                    targets.insert(
                        name.clone(),
                        TargetRecord {
                            name,
                            primitive: id.to_string(),
                            iqn,
                            tid,
                            luns: Vec::new(),
                        },
                    );
                    DeclarationKind::Target
                }
                Some(LU_AGENT) => {
                    let attributes = instance_attributes(&node);
                    let lun = attributes.get("lun").and_then(|v| v.parse::<u8>().ok());
                    let owner = attributes
                        .get("target_iqn")
                        .map(|s| s.as_str())
                        .and_then(target_name_from_iqn);
                    if let (Some(owner), Some(lun)) = (owner, lun) {
                        orphan_luns.push((owner.to_string(), lun));
                    }
                    DeclarationKind::LogicalUnit
                }
                Some(IP_AGENT) => DeclarationKind::ServiceAddress,
                _ => DeclarationKind::Other,
            };
            declarations.insert(id.to_string(), kind);
        }

        for (owner, lun) in orphan_luns {
            if let Some(record) = targets.get_mut(&owner) {
                record.luns.push(lun);
            }
        }
        let mut targets: Vec<TargetRecord> = targets.into_values().collect();
        for record in &mut targets {
            record.luns.sort_unstable();
        }

        let mut constraint_refs = HashMap::new();
        for node in constraints.children().filter(|n| n.is_element()) {
            if let Some(id) = node.attribute("id") {
                declaration_ranges.insert(id.to_string(), node.range());
                declarations.insert(id.to_string(), DeclarationKind::Constraint);

                let refs: Vec<String> = ["first", "then", "rsc", "with-rsc"]
                    .iter()
                    .filter_map(|attr| node.attribute(*attr))
                    .map(|v| v.to_string())
                    .collect();
                constraint_refs.insert(id.to_string(), refs);
            }
        }

        Ok(Self {
            version: document.version,
            source: document.xml.clone(),
            declarations,
            declaration_ranges,
            constraint_refs,
            resources_range: resources.range(),
            constraints_range: constraints.range(),
            run_states: parse_run_states(&tree),
            targets,
            tid_set,
        })
    }

    /// The version token this snapshot was parsed from; a subsequent write
    /// must carry it.
    pub fn version(&self) -> CibVersion {
        self.version
    }

    pub fn contains(&self, name: &str) -> bool {
        self.declarations.contains_key(name)
    }

    pub fn kind(&self, name: &str) -> Option<DeclarationKind> {
        self.declarations.get(name).copied()
    }

    /// Declaration names of the given kind, in document order.
    pub fn names_of_kind(&self, kind: DeclarationKind) -> Vec<String> {
        self.declarations
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn target(&self, name: &str) -> Option<&TargetRecord> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Names of the constraint edges referencing any of the given resource
    /// names, in document order.
    pub fn constraints_referencing(&self, resources: &BTreeSet<String>) -> Vec<String> {
        self.declarations
            .keys()
            .filter(|name| {
                self.constraint_refs
                    .get(*name)
                    .is_some_and(|refs| refs.iter().any(|r| resources.contains(r)))
            })
            .cloned()
            .collect()
    }

    /// Observed run state of one declaration. Absence from the status
    /// section is `Unknown`, never `Stopped`.
    pub fn run_state(&self, name: &str) -> RunState {
        self.run_states
            .get(name)
            .copied()
            .unwrap_or(RunState::Unknown)
    }

    /// Build a new document with the declaration set appended to the
    /// resources and constraints sections. The snapshot is left untouched.
    pub fn with_declarations(&self, set: &DeclarationSet) -> Result<String> {
        for declaration in set.iter() {
            if self.contains(declaration.name()) {
                return Err(Error::CibWrite(format!(
                    "declaration {} already exists in the configuration",
                    declaration.name()
                )));
            }
        }

        let resources = set.render_resources()?;
        let constraints = set.render_constraints()?;
        // The constraints section follows the resources section in document
        // order, so splicing it first keeps the resources range valid.
        let document = insert_fragment(
            &self.source,
            &self.constraints_range,
            "constraints",
            &constraints,
        );
        Ok(insert_fragment(
            &document,
            &self.resources_range,
            "resources",
            &resources,
        ))
    }

    /// Build a new document with the named declarations removed. Names not
    /// present in the snapshot are skipped.
    pub fn without_declarations(&self, names: &BTreeSet<String>) -> String {
        let mut ranges: Vec<&Range<usize>> = names
            .iter()
            .filter_map(|name| self.declaration_ranges.get(name))
            .collect();
        ranges.sort_by_key(|r| std::cmp::Reverse(r.start));

        let mut document = self.source.clone();
        for range in ranges {
            document.replace_range(range.clone(), "");
        }
        document
    }
}

// =============================================================================
// Document Helpers
// =============================================================================

fn find_section<'a>(
    tree: &'a roxmltree::Document<'a>,
    name: &str,
) -> Result<roxmltree::Node<'a, 'a>> {
    tree.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .ok_or_else(|| Error::CibParse(format!("document has no <{}> section", name)))
}

/// Splice an XML fragment into a section element, handling both the expanded
/// and the self-closing form of the section tag.
fn insert_fragment(source: &str, section: &Range<usize>, tag: &str, fragment: &str) -> String {
    if fragment.is_empty() {
        return source.to_string();
    }

    let slice = &source[section.clone()];
    let mut document = String::with_capacity(source.len() + fragment.len());
    document.push_str(&source[..section.start]);

    if let Some(stripped) = slice.strip_suffix("/>") {
        document.push_str(stripped);
        document.push('>');
        document.push_str(fragment);
        document.push_str("</");
        document.push_str(tag);
        document.push('>');
    } else {
        let closing = format!("</{}", tag);
        let at = slice.rfind(&closing).unwrap_or(slice.len());
        document.push_str(&slice[..at]);
        document.push_str(fragment);
        document.push_str(&slice[at..]);
    }

    document.push_str(&source[section.end..]);
    document
}

/// Extract the target short name from an IQN: the substring after the first
/// `:` separator.
pub fn target_name_from_iqn(iqn: &str) -> Option<&str> {
    iqn.split_once(':').map(|(_, name)| name)
}

fn instance_attributes(node: &roxmltree::Node<'_, '_>) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().name() != "instance_attributes" {
            continue;
        }
        for nvpair in child.children().filter(|n| n.is_element()) {
            if nvpair.tag_name().name() != "nvpair" {
                continue;
            }
            if let (Some(name), Some(value)) =
                (nvpair.attribute("name"), nvpair.attribute("value"))
            {
                attributes.insert(name.to_string(), value.to_string());
            }
        }
    }
    attributes
}

// =============================================================================
// Status Section
// =============================================================================

/// Collapse the status section into one run state per declaration name.
///
/// Each node's resource history lists completed operations; the one with the
/// highest call id is the most recent. When several nodes report history for
/// the same resource (a past host and the current one), a `Running` report
/// wins over `Stopped`, which wins over `Unknown`.
fn parse_run_states(tree: &roxmltree::Document<'_>) -> HashMap<String, RunState> {
    let mut run_states: HashMap<String, RunState> = HashMap::new();

    for resource in tree
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "lrm_resource")
    {
        let Some(id) = resource.attribute("id") else {
            continue;
        };

        let latest = resource
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "lrm_rsc_op")
            .max_by_key(|op| {
                op.attribute("call-id")
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0)
            });

        let state = match latest {
            Some(op) => run_state_from_op(
                op.attribute("operation").unwrap_or(""),
                op.attribute("rc-code").unwrap_or(""),
            ),
            None => RunState::Unknown,
        };

        run_states
            .entry(id.to_string())
            .and_modify(|current| *current = merge_node_states(*current, state))
            .or_insert(state);
    }

    run_states
}

/// Map one completed operation to a run state. Anything unrecognized is
/// `Unknown`, never guessed.
fn run_state_from_op(operation: &str, rc_code: &str) -> RunState {
    match (operation, rc_code) {
        // OCF_NOT_RUNNING from any operation
        (_, "7") => RunState::Stopped,
        ("stop", "0") => RunState::Stopped,
        ("start", "0") | ("monitor", "0") | ("promote", "0") => RunState::Running,
        _ => RunState::Unknown,
    }
}

fn merge_node_states(a: RunState, b: RunState) -> RunState {
    match (a, b) {
        (RunState::Running, _) | (_, RunState::Running) => RunState::Running,
        (RunState::Stopped, _) | (_, RunState::Stopped) => RunState::Stopped,
        _ => RunState::Unknown,
    }
}

/// Extract the version token from the root element of a raw document.
pub fn parse_version(xml: &str) -> Result<CibVersion> {
    let tree = roxmltree::Document::parse(xml)
        .map_err(|e| Error::CibParse(format!("not well-formed XML: {}", e)))?;
    let root = tree.root_element();

    let field = |name: &str| -> Result<u64> {
        match root.attribute(name) {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| Error::CibParse(format!("invalid {} attribute: {}", name, value))),
            None => Ok(0),
        }
    };

    Ok(CibVersion::new(
        field("admin_epoch")?,
        field("epoch")?,
        field("num_updates")?,
    ))
}
