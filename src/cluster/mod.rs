//! Cluster configuration control core
//!
//! Everything that touches the cluster resource manager's configuration
//! document: fetching and replacing it, parsing it into a typed snapshot,
//! allocating target IDs, synthesizing resource declarations and constraint
//! edges, and probing observed run state.

pub mod builder;
pub mod cibadmin;
pub mod config;
pub mod declarations;
pub mod probe;
pub mod tid;

pub use builder::*;
pub use cibadmin::*;
pub use config::*;
pub use declarations::*;
pub use probe::*;
pub use tid::*;

/// Canned configuration documents shared by the unit tests in this module
/// and by the orchestration tests.
#[cfg(test)]
pub(crate) mod fixtures {
    /// A cluster that has never hosted an iSCSI target: empty resources,
    /// constraints and status sections, with the sections self-closed the
    /// way the store emits them.
    pub fn empty_cib() -> String {
        r#"<cib admin_epoch="0" epoch="1" num_updates="0" validate-with="pacemaker-3.0">
  <configuration>
    <crm_config/>
    <nodes>
      <node id="1" uname="node-a"/>
      <node id="2" uname="node-b"/>
    </nodes>
    <resources/>
    <constraints/>
  </configuration>
  <status/>
</cib>
"#
        .to_string()
    }

    /// One target `disk0` with LUNs 0 and 1, a floating address, the full
    /// constraint footprint, one unrelated resource, and a status section
    /// where everything runs on node-a except LUN 1, which was stopped.
    pub fn populated_cib() -> String {
        r#"<cib admin_epoch="0" epoch="5" num_updates="2" validate-with="pacemaker-3.0">
  <configuration>
    <crm_config/>
    <nodes>
      <node id="1" uname="node-a"/>
      <node id="2" uname="node-b"/>
    </nodes>
    <resources>
      <primitive id="p_iscsi_disk0" class="ocf" provider="heartbeat" type="iSCSITarget">
        <instance_attributes id="p_iscsi_disk0-ia">
          <nvpair id="p_iscsi_disk0-ia-iqn" name="iqn" value="iqn.2020-01.com.example:disk0"/>
          <nvpair id="p_iscsi_disk0-ia-tid" name="tid" value="0"/>
        </instance_attributes>
      </primitive>
      <primitive id="p_iscsi_disk0_ip" class="ocf" provider="heartbeat" type="IPaddr2">
        <instance_attributes id="p_iscsi_disk0_ip-ia">
          <nvpair id="p_iscsi_disk0_ip-ia-ip" name="ip" value="10.0.0.5"/>
          <nvpair id="p_iscsi_disk0_ip-ia-cidr_netmask" name="cidr_netmask" value="24"/>
        </instance_attributes>
      </primitive>
      <primitive id="p_iscsi_disk0_lu0" class="ocf" provider="heartbeat" type="iSCSILogicalUnit">
        <instance_attributes id="p_iscsi_disk0_lu0-ia">
          <nvpair id="p_iscsi_disk0_lu0-ia-target_iqn" name="target_iqn" value="iqn.2020-01.com.example:disk0"/>
          <nvpair id="p_iscsi_disk0_lu0-ia-lun" name="lun" value="0"/>
          <nvpair id="p_iscsi_disk0_lu0-ia-path" name="path" value="/dev/drbd1000"/>
        </instance_attributes>
      </primitive>
      <primitive id="p_iscsi_disk0_lu1" class="ocf" provider="heartbeat" type="iSCSILogicalUnit">
        <instance_attributes id="p_iscsi_disk0_lu1-ia">
          <nvpair id="p_iscsi_disk0_lu1-ia-target_iqn" name="target_iqn" value="iqn.2020-01.com.example:disk0"/>
          <nvpair id="p_iscsi_disk0_lu1-ia-lun" name="lun" value="1"/>
          <nvpair id="p_iscsi_disk0_lu1-ia-path" name="path" value="/dev/drbd1001"/>
        </instance_attributes>
      </primitive>
      <primitive id="p_dummy" class="ocf" provider="pacemaker" type="Dummy"/>
    </resources>
    <constraints>
      <rsc_order id="ord_disk0_ip_before_target" first="p_iscsi_disk0_ip" then="p_iscsi_disk0" kind="Mandatory"/>
      <rsc_colocation id="col_disk0_target_with_ip" rsc="p_iscsi_disk0" with-rsc="p_iscsi_disk0_ip" score="INFINITY"/>
      <rsc_location id="loc_disk0_node-a" rsc="p_iscsi_disk0" node="node-a" score="100"/>
      <rsc_location id="loc_disk0_node-b" rsc="p_iscsi_disk0" node="node-b" score="100"/>
      <rsc_order id="ord_disk0_target_before_lu0" first="p_iscsi_disk0" then="p_iscsi_disk0_lu0" kind="Mandatory"/>
      <rsc_colocation id="col_disk0_lu0_with_target" rsc="p_iscsi_disk0_lu0" with-rsc="p_iscsi_disk0" score="INFINITY"/>
      <rsc_order id="ord_disk0_target_before_lu1" first="p_iscsi_disk0" then="p_iscsi_disk0_lu1" kind="Mandatory"/>
      <rsc_colocation id="col_disk0_lu1_with_target" rsc="p_iscsi_disk0_lu1" with-rsc="p_iscsi_disk0" score="INFINITY"/>
    </constraints>
  </configuration>
  <status>
    <node_state id="1" uname="node-a">
      <lrm id="1">
        <lrm_resources>
          <lrm_resource id="p_iscsi_disk0" type="iSCSITarget" class="ocf" provider="heartbeat">
            <lrm_rsc_op id="p_iscsi_disk0_last_0" operation="start" call-id="10" rc-code="0"/>
          </lrm_resource>
          <lrm_resource id="p_iscsi_disk0_ip" type="IPaddr2" class="ocf" provider="heartbeat">
            <lrm_rsc_op id="p_iscsi_disk0_ip_last_0" operation="monitor" call-id="12" rc-code="0"/>
          </lrm_resource>
          <lrm_resource id="p_iscsi_disk0_lu0" type="iSCSILogicalUnit" class="ocf" provider="heartbeat">
            <lrm_rsc_op id="p_iscsi_disk0_lu0_last_0" operation="start" call-id="13" rc-code="0"/>
          </lrm_resource>
          <lrm_resource id="p_iscsi_disk0_lu1" type="iSCSILogicalUnit" class="ocf" provider="heartbeat">
            <lrm_rsc_op id="p_iscsi_disk0_lu1_start" operation="start" call-id="14" rc-code="0"/>
            <lrm_rsc_op id="p_iscsi_disk0_lu1_stop" operation="stop" call-id="20" rc-code="0"/>
          </lrm_resource>
        </lrm_resources>
      </lrm>
    </node_state>
  </status>
</cib>
"#
        .to_string()
    }

    /// The `disk0` footprint with LUN 0 only and a status section that has
    /// never seen any of it scheduled.
    pub fn empty_status_cib() -> String {
        r#"<cib admin_epoch="0" epoch="2" num_updates="0" validate-with="pacemaker-3.0">
  <configuration>
    <crm_config/>
    <nodes>
      <node id="1" uname="node-a"/>
    </nodes>
    <resources>
      <primitive id="p_iscsi_disk0" class="ocf" provider="heartbeat" type="iSCSITarget">
        <instance_attributes id="p_iscsi_disk0-ia">
          <nvpair id="p_iscsi_disk0-ia-iqn" name="iqn" value="iqn.2020-01.com.example:disk0"/>
          <nvpair id="p_iscsi_disk0-ia-tid" name="tid" value="0"/>
        </instance_attributes>
      </primitive>
      <primitive id="p_iscsi_disk0_ip" class="ocf" provider="heartbeat" type="IPaddr2">
        <instance_attributes id="p_iscsi_disk0_ip-ia">
          <nvpair id="p_iscsi_disk0_ip-ia-ip" name="ip" value="10.0.0.5"/>
        </instance_attributes>
      </primitive>
      <primitive id="p_iscsi_disk0_lu0" class="ocf" provider="heartbeat" type="iSCSILogicalUnit">
        <instance_attributes id="p_iscsi_disk0_lu0-ia">
          <nvpair id="p_iscsi_disk0_lu0-ia-target_iqn" name="target_iqn" value="iqn.2020-01.com.example:disk0"/>
          <nvpair id="p_iscsi_disk0_lu0-ia-lun" name="lun" value="0"/>
          <nvpair id="p_iscsi_disk0_lu0-ia-path" name="path" value="/dev/drbd1000"/>
        </instance_attributes>
      </primitive>
    </resources>
    <constraints/>
  </configuration>
  <status/>
</cib>
"#
        .to_string()
    }
}
